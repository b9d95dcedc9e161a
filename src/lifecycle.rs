//! Session state machine and start/stop orchestration.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_channel::Receiver;

use crate::bridge::CallbackSink;
use crate::constants::{MIN_RING_CAPACITY, RING_RATE_DIVISOR};
use crate::error::{Result, SourceError};
use crate::events::{EventSender, SourceEvent, event_queue};
use crate::hal::RadioDriver;
use crate::session::DeviceSession;

/// Lifecycle of one device session.
///
/// `Running` is entered by the callback sink when the first chunk
/// arrives. `Stopped` is terminal: the device handle is closed, so a new
/// session must be selected to stream again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Unselected = 0,
    Selected = 1,
    Started = 2,
    Running = 3,
    Stopped = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Unselected,
            1 => SessionState::Selected,
            2 => SessionState::Started,
            3 => SessionState::Running,
            _ => SessionState::Stopped,
        }
    }
}

/// Atomic state cell shared between the control thread and the callback
/// sink.
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Started -> Running on the first delivered chunk. No effect in any
    /// other state.
    pub(crate) fn mark_running(&self) {
        let _ = self.0.compare_exchange(
            SessionState::Started as u8,
            SessionState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Orchestrates callback registration, buffer sizing, and teardown.
pub struct LifecycleController {
    state: Arc<StateCell>,
    events_tx: EventSender,
    events_rx: Receiver<SourceEvent>,
    sink: Option<Arc<CallbackSink>>,
    ring_capacity_override: Option<usize>,
}

impl LifecycleController {
    pub(crate) fn new() -> Self {
        let (events_tx, events_rx) = event_queue();
        Self {
            state: Arc::new(StateCell::new(SessionState::Unselected)),
            events_tx,
            events_rx,
            sink: None,
            ring_capacity_override: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> Arc<StateCell> {
        self.state.clone()
    }

    pub(crate) fn mark_selected(&self) {
        self.state.set(SessionState::Selected);
    }

    pub(crate) fn set_ring_capacity(&mut self, capacity: usize) {
        self.ring_capacity_override = Some(capacity);
    }

    /// Receiver for asynchronous stream conditions. Consumable while
    /// Running; cloned receivers share the same queue.
    pub fn events(&self) -> Receiver<SourceEvent> {
        self.events_rx.clone()
    }

    pub(crate) fn sink(&self) -> Option<&Arc<CallbackSink>> {
        self.sink.as_ref()
    }

    /// Size the per-channel rings, register the callback sink with the
    /// driver, and enter Started. Any failure leaves the state at
    /// Selected with no buffers allocated.
    pub(crate) fn start<D: RadioDriver>(
        &mut self,
        session: &DeviceSession<D>,
    ) -> Result<Arc<CallbackSink>> {
        match self.state.get() {
            SessionState::Selected => {}
            state => {
                return Err(SourceError::InvalidState {
                    operation: "start",
                    state,
                });
            }
        }

        let config = session.config();
        let num_channels = config.channels.len();
        let capacity = self
            .ring_capacity_override
            .unwrap_or_else(|| ring_capacity(config.sample_rate_hz));

        let sink = Arc::new(CallbackSink::new(
            num_channels,
            capacity,
            self.events_tx.clone(),
            self.state.clone(),
        ));
        session.with_driver(|driver| driver.start_stream(sink.clone(), num_channels))?;

        self.sink = Some(sink.clone());
        self.state.set(SessionState::Started);
        log::info!(
            "Streaming started: {} channel(s), ring capacity {} samples",
            num_channels,
            capacity
        );
        Ok(sink)
    }

    /// Unregister the callback, release buffers, close the device.
    /// Idempotent; never faults on a second call. Driver teardown errors
    /// are logged, not propagated, so teardown always completes.
    pub(crate) fn stop<D: RadioDriver>(&mut self, session: &DeviceSession<D>) -> Result<()> {
        match self.state.get() {
            SessionState::Stopped => return Ok(()),
            SessionState::Started | SessionState::Running => {
                // stop_stream returns only once in-flight deliveries have
                // quiesced, making the buffer release below safe
                if let Err(e) = session.with_driver(|driver| driver.stop_stream()) {
                    log::warn!("stop_stream failed during teardown: {}", e);
                }
            }
            SessionState::Unselected | SessionState::Selected => {}
        }

        self.sink = None;
        if let Err(e) = session.with_driver(|driver| driver.close()) {
            log::warn!("Device close failed during teardown: {}", e);
        }
        self.state.set(SessionState::Stopped);
        log::info!("Session stopped");
        Ok(())
    }
}

/// Ring capacity for a sample rate: a fixed fraction of a second,
/// floored at `MIN_RING_CAPACITY`.
pub(crate) fn ring_capacity(sample_rate_hz: f64) -> usize {
    ((sample_rate_hz as usize) / RING_RATE_DIVISOR).max(MIN_RING_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_running_only_from_started() {
        let cell = StateCell::new(SessionState::Selected);
        cell.mark_running();
        assert_eq!(cell.get(), SessionState::Selected);

        cell.set(SessionState::Started);
        cell.mark_running();
        assert_eq!(cell.get(), SessionState::Running);

        // Second chunk is a no-op
        cell.mark_running();
        assert_eq!(cell.get(), SessionState::Running);
    }

    #[test]
    fn test_ring_capacity_floor() {
        assert_eq!(ring_capacity(62_500.0), MIN_RING_CAPACITY);
        assert_eq!(ring_capacity(8e6), 1_000_000);
    }
}
