//! Callback-side glue: continuity check, ring write, event emission.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bridge::gap::{Continuity, GapTracker};
use crate::bridge::ring::SampleBridge;
use crate::events::{EventSender, SourceEvent};
use crate::hal::StreamSink;
use crate::lifecycle::StateCell;

/// Counters for one channel's delivery path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelStats {
    /// Samples accepted into the ring.
    pub delivered: u64,
    /// Samples dropped to ring overflow.
    pub dropped: u64,
    /// Gap episodes reported.
    pub gaps: u64,
    /// Samples lost to gaps.
    pub samples_lost: u64,
}

struct ChannelPath {
    bridge: Arc<SampleBridge>,
    gap: Mutex<GapTracker>,
}

/// Everything the driver's callback thread touches per delivery.
///
/// Shared with the control side only through `Arc`; the per-channel
/// bridge mutex is the single point of contention with the pull thread,
/// and the gap tracker's own lock is contended only by a mode-change
/// reset.
pub struct CallbackSink {
    channels: Vec<ChannelPath>,
    events: EventSender,
    state: Arc<StateCell>,
}

impl CallbackSink {
    pub(crate) fn new(num_channels: usize, capacity: usize, events: EventSender, state: Arc<StateCell>) -> Self {
        let channels = (0..num_channels)
            .map(|_| ChannelPath {
                bridge: Arc::new(SampleBridge::new(capacity)),
                gap: Mutex::new(GapTracker::new()),
            })
            .collect();
        Self {
            channels,
            events,
            state,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn bridge(&self, channel: usize) -> Option<&Arc<SampleBridge>> {
        self.channels.get(channel).map(|path| &path.bridge)
    }

    /// Bounded wait for buffered samples on one channel.
    pub fn wait_available(&self, channel: usize, timeout: Duration) -> usize {
        self.channels
            .get(channel)
            .map(|path| path.bridge.wait_available(timeout))
            .unwrap_or(0)
    }

    /// Re-baseline one channel ahead of an intentional restart so the
    /// fresh index sequence is not reported as a discontinuity.
    pub(crate) fn reset_channel(&self, channel: usize) {
        if let Some(path) = self.channels.get(channel) {
            path.gap.lock().unwrap().reset();
        }
    }

    pub(crate) fn notify_mode_change(&self, channel: usize) {
        self.events.emit(SourceEvent::ModeChangeApplied { channel });
    }

    pub fn stats(&self, channel: usize) -> Option<ChannelStats> {
        self.channels.get(channel).map(|path| {
            let gap = path.gap.lock().unwrap();
            ChannelStats {
                delivered: path.bridge.delivered(),
                dropped: path.bridge.dropped(),
                gaps: gap.gap_count(),
                samples_lost: gap.samples_lost(),
            }
        })
    }
}

impl StreamSink for CallbackSink {
    fn deliver(&self, channel: usize, i: &[i16], q: &[i16], first_index: u64) {
        let Some(path) = self.channels.get(channel) else {
            log::warn!("Chunk for unconfigured channel {}", channel);
            return;
        };
        if i.is_empty() || i.len() != q.len() {
            return;
        }

        match path.gap.lock().unwrap().check(first_index, i.len()) {
            Continuity::Contiguous => {}
            Continuity::Gap { missing } => {
                log::warn!("Channel {}: {} samples lost", channel, missing);
                self.events.emit(SourceEvent::Gap { channel, missing });
            }
            Continuity::Rewind { overlap } => {
                log::warn!(
                    "Channel {}: sample index rewound by {}",
                    channel,
                    overlap
                );
                self.events.emit(SourceEvent::Rewind { channel, overlap });
            }
        }

        let outcome = path.bridge.deliver(i, q);
        if outcome.overflow_started {
            log::warn!(
                "Channel {}: ring full, dropping newest samples",
                channel
            );
            self.events.emit(SourceEvent::Overflow { channel });
        }

        self.state.mark_running();
    }

    fn overload(&self, channel: usize) {
        log::warn!("Channel {}: ADC overload", channel);
        self.events.emit(SourceEvent::Overload { channel });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_queue;
    use crate::lifecycle::SessionState;

    fn sink_with_queue(capacity: usize) -> (CallbackSink, crossbeam_channel::Receiver<SourceEvent>) {
        let (tx, rx) = event_queue();
        let state = Arc::new(StateCell::new(SessionState::Started));
        (CallbackSink::new(1, capacity, tx, state), rx)
    }

    #[test]
    fn test_first_chunk_marks_running() {
        let (tx, _rx) = event_queue();
        let state = Arc::new(StateCell::new(SessionState::Started));
        let sink = CallbackSink::new(1, 64, tx, state.clone());

        let i = [1i16; 8];
        let q = [2i16; 8];
        sink.deliver(0, &i, &q, 0);
        assert_eq!(state.get(), SessionState::Running);
    }

    #[test]
    fn test_gap_event_emitted() {
        let (sink, rx) = sink_with_queue(1024);
        let i = [0i16; 100];
        let q = [0i16; 100];
        sink.deliver(0, &i, &q, 0);
        sink.deliver(0, &i, &q, 150);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![SourceEvent::Gap {
                channel: 0,
                missing: 50
            }]
        );
    }

    #[test]
    fn test_reset_channel_suppresses_restart_discontinuity() {
        let (sink, rx) = sink_with_queue(4096);
        let i = [0i16; 100];
        let q = [0i16; 100];
        sink.deliver(0, &i, &q, 1_000_000);
        sink.reset_channel(0);
        sink.deliver(0, &i, &q, 0);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_unknown_channel_ignored() {
        let (sink, rx) = sink_with_queue(64);
        let i = [0i16; 8];
        let q = [0i16; 8];
        sink.deliver(3, &i, &q, 0);
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(sink.stats(0).unwrap().delivered, 0);
    }
}
