//! Public facade tying session, lifecycle, and stream engine together.

use std::time::Duration;

use crossbeam_channel::Receiver;
use num_complex::Complex32;

use crate::bridge::ChannelStats;
use crate::config::{DcOffsetMode, DeviceConfig};
use crate::error::{Result, SourceError};
use crate::events::SourceEvent;
use crate::hal::RadioDriver;
use crate::lifecycle::{LifecycleController, SessionState};
use crate::session::DeviceSession;
use crate::stream::StreamEngine;

/// A pull-based complex sample source over one opened device.
///
/// The hardware delivers chunks on its own callback thread; the consumer
/// pulls on its own cadence and reconfigures the device live through the
/// setters. Construction selects the device; `start` begins capture.
pub struct IqSource<D: RadioDriver> {
    session: DeviceSession<D>,
    lifecycle: LifecycleController,
    engine: Option<StreamEngine>,
}

impl<D: RadioDriver> IqSource<D> {
    /// Take ownership of an opened device and map `num_channels` logical
    /// channels onto its tuners.
    pub fn select(driver: D, num_channels: usize) -> Result<Self> {
        let lifecycle = LifecycleController::new();
        let session = DeviceSession::select(driver, num_channels, lifecycle.state_cell())?;
        lifecycle.mark_selected();
        log::info!("Selected {}", session.description());
        Ok(Self {
            session,
            lifecycle,
            engine: None,
        })
    }

    /// Override the per-channel ring capacity chosen at `start`. The
    /// default is sized from the sample rate.
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.lifecycle.set_ring_capacity(capacity);
        self
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Receiver for gap/overflow/overload notifications. Streaming
    /// continues regardless of what is (or is not) consumed here.
    pub fn events(&self) -> Receiver<SourceEvent> {
        self.lifecycle.events()
    }

    pub fn num_channels(&self) -> usize {
        self.session.num_channels()
    }

    pub fn description(&self) -> String {
        self.session.description()
    }

    /// Snapshot of the applied configuration.
    pub fn config(&self) -> DeviceConfig {
        self.session.config()
    }

    /// Delivery counters for one channel, available once started.
    pub fn channel_stats(&self, channel: usize) -> Option<ChannelStats> {
        self.lifecycle.sink().and_then(|sink| sink.stats(channel))
    }

    /// Allocate buffers and register the hardware callback. Fails
    /// without side effects when not in Selected.
    pub fn start(&mut self) -> Result<()> {
        let sink = self.lifecycle.start(&self.session)?;
        self.engine = Some(StreamEngine::new(sink));
        Ok(())
    }

    /// Stop streaming and close the device. Idempotent; safe from any
    /// state after selection.
    pub fn stop(&mut self) -> Result<()> {
        self.lifecycle.stop(&self.session)?;
        self.engine = None;
        Ok(())
    }

    /// Pull up to `out.len()` samples for `channel`.
    ///
    /// Synchronous and non-blocking: returns the count produced, 0 when
    /// nothing is buffered this cycle. Queued mode changes are applied
    /// here, before draining, since the pull thread outside a callback
    /// is the stream's quiescent point.
    pub fn pull(&mut self, channel: usize, out: &mut [Complex32]) -> Result<usize> {
        match self.state() {
            SessionState::Started | SessionState::Running => {}
            state => {
                return Err(SourceError::InvalidState {
                    operation: "pull",
                    state,
                });
            }
        }

        if self.session.has_pending() {
            if let Some(sink) = self.lifecycle.sink() {
                self.session.apply_pending(sink)?;
            }
        }

        let Some(engine) = self.engine.as_mut() else {
            return Err(SourceError::InvalidState {
                operation: "pull",
                state: self.lifecycle.state(),
            });
        };
        engine.pull(channel, out)
    }

    /// Block for at most `timeout` until samples are buffered on
    /// `channel`; returns the count available. A convenience for
    /// consumers that would otherwise spin on empty pulls.
    pub fn wait_available(&self, channel: usize, timeout: Duration) -> Result<usize> {
        match self.state() {
            SessionState::Started | SessionState::Running => {}
            state => {
                return Err(SourceError::InvalidState {
                    operation: "wait_available",
                    state,
                });
            }
        }
        Ok(self
            .lifecycle
            .sink()
            .map(|sink| sink.wait_available(channel, timeout))
            .unwrap_or(0))
    }

    fn ensure_configurable(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            SessionState::Selected | SessionState::Started | SessionState::Running => Ok(()),
            state => Err(SourceError::InvalidState { operation, state }),
        }
    }

    pub fn set_sample_rate(&self, rate_hz: f64) -> Result<f64> {
        self.ensure_configurable("set_sample_rate")?;
        self.session.set_sample_rate(rate_hz)
    }

    pub fn sample_rate(&self) -> f64 {
        self.session.config().sample_rate_hz
    }

    pub fn set_center_freq(&self, channel: usize, freq_hz: f64) -> Result<f64> {
        self.ensure_configurable("set_center_freq")?;
        self.session.set_center_freq(channel, freq_hz)
    }

    pub fn center_freq(&self, channel: usize) -> Result<f64> {
        self.channel_config(channel).map(|c| c.center_freq_hz)
    }

    pub fn set_freq_corr(&self, channel: usize, ppm: f64) -> Result<f64> {
        self.ensure_configurable("set_freq_corr")?;
        self.session.set_freq_corr(channel, ppm)
    }

    pub fn freq_corr(&self, channel: usize) -> Result<f64> {
        self.channel_config(channel).map(|c| c.freq_corr_ppm)
    }

    pub fn set_if_gain(&self, channel: usize, gain_db: f64) -> Result<f64> {
        self.ensure_configurable("set_if_gain")?;
        self.session.set_if_gain(channel, gain_db)
    }

    pub fn if_gain(&self, channel: usize) -> Result<f64> {
        self.channel_config(channel).map(|c| c.if_gain_db)
    }

    pub fn set_rf_gain(&self, channel: usize, gain_db: f64) -> Result<f64> {
        self.ensure_configurable("set_rf_gain")?;
        self.session.set_rf_gain(channel, gain_db)
    }

    pub fn rf_gain(&self, channel: usize) -> Result<f64> {
        self.channel_config(channel).map(|c| c.rf_gain_db)
    }

    pub fn set_gain_mode(&self, channel: usize, automatic: bool) -> Result<bool> {
        self.ensure_configurable("set_gain_mode")?;
        self.session.set_gain_mode(channel, automatic)
    }

    pub fn gain_mode(&self, channel: usize) -> Result<bool> {
        self.channel_config(channel).map(|c| c.auto_gain)
    }

    pub fn set_antenna(&self, channel: usize, antenna: &str) -> Result<String> {
        self.ensure_configurable("set_antenna")?;
        self.session.set_antenna(channel, antenna)
    }

    pub fn antenna(&self, channel: usize) -> Result<String> {
        self.channel_config(channel).map(|c| c.antenna)
    }

    pub fn set_rf_notch(&self, channel: usize, enable: bool) -> Result<bool> {
        self.ensure_configurable("set_rf_notch")?;
        self.session.set_rf_notch(channel, enable)
    }

    pub fn rf_notch(&self, channel: usize) -> Result<bool> {
        self.channel_config(channel).map(|c| c.rf_notch)
    }

    pub fn set_dab_notch(&self, channel: usize, enable: bool) -> Result<bool> {
        self.ensure_configurable("set_dab_notch")?;
        self.session.set_dab_notch(channel, enable)
    }

    pub fn dab_notch(&self, channel: usize) -> Result<bool> {
        self.channel_config(channel).map(|c| c.dab_notch)
    }

    pub fn set_dc_offset_mode(&self, channel: usize, mode: DcOffsetMode) -> Result<DcOffsetMode> {
        self.ensure_configurable("set_dc_offset_mode")?;
        self.session.set_dc_offset_mode(channel, mode)
    }

    pub fn dc_offset_mode(&self, channel: usize) -> Result<DcOffsetMode> {
        self.channel_config(channel).map(|c| c.dc_offset)
    }

    pub fn set_bandwidth(&self, channel: usize, bw_hz: f64) -> Result<f64> {
        self.ensure_configurable("set_bandwidth")?;
        self.session.set_bandwidth(channel, bw_hz)
    }

    pub fn bandwidth(&self, channel: usize) -> Result<f64> {
        self.channel_config(channel).map(|c| c.bandwidth_hz)
    }

    fn channel_config(&self, channel: usize) -> Result<crate::config::ChannelConfig> {
        let config = self.session.config();
        let available = config.channels.len();
        config
            .channels
            .into_iter()
            .nth(channel)
            .ok_or(SourceError::InvalidChannel { channel, available })
    }
}

impl<D: RadioDriver> Drop for IqSource<D> {
    fn drop(&mut self) {
        if !matches!(self.state(), SessionState::Stopped) {
            let _ = self.stop();
        }
    }
}
