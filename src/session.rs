//! Device ownership and configuration serialization.
//!
//! The session holds the opened hardware handle and the applied
//! configuration under two separate locks, both distinct from the sample
//! path's bridge mutex: a configuration call in flight never stalls
//! sample delivery.

use std::sync::{Arc, Mutex};

use crate::bridge::CallbackSink;
use crate::config::{DcOffsetMode, DeviceConfig};
use crate::error::{Result, SourceError};
use crate::hal::RadioDriver;
use crate::lifecycle::{SessionState, StateCell};

/// A restart-requiring reconfiguration recorded while streaming, applied
/// at the next quiescent point.
#[derive(Debug, Clone)]
pub struct PendingModeChange {
    pub channel: usize,
    pub antenna: String,
}

/// Owns the opened device and serializes configuration changes against
/// the streaming state.
pub struct DeviceSession<D: RadioDriver> {
    driver: Mutex<D>,
    config: Mutex<DeviceConfig>,
    pending: Mutex<Vec<PendingModeChange>>,
    state: Arc<StateCell>,
}

impl<D: RadioDriver> DeviceSession<D> {
    /// Take ownership of an opened device, validate the requested channel
    /// layout against its capabilities, and push the default
    /// configuration to the hardware so recorded and applied values
    /// agree from the start.
    pub(crate) fn select(mut driver: D, num_channels: usize, state: Arc<StateCell>) -> Result<Self> {
        let caps = driver.caps().clone();
        if num_channels == 0 || num_channels > caps.tuners.len() {
            return Err(SourceError::UnsupportedChannels(format!(
                "{} channel(s) requested, device has {} tuner(s)",
                num_channels,
                caps.tuners.len()
            )));
        }

        let mut config = DeviceConfig::with_channels(num_channels);
        config.sample_rate_hz = caps.sample_rate_range.clamp(config.sample_rate_hz);
        config.sample_rate_hz = driver.set_sample_rate(config.sample_rate_hz)?;

        // Channel k starts on tuner k's first antenna port
        for (channel, channel_config) in config.channels.iter_mut().enumerate() {
            let tuner = &caps.tuners[channel];
            let port = tuner.antennas.first().ok_or_else(|| {
                SourceError::UnsupportedChannels(format!(
                    "tuner {} exposes no antenna ports",
                    channel
                ))
            })?;

            channel_config.antenna = driver.set_antenna(channel, &port.name)?;
            channel_config.tuner_role = port.role;
            channel_config.center_freq_hz = driver
                .set_center_freq(channel, tuner.freq_range.clamp(channel_config.center_freq_hz))?;
            channel_config.if_gain_db = driver
                .set_if_gain(channel, tuner.if_gain_range.clamp(channel_config.if_gain_db))?;
            channel_config.rf_gain_db = driver
                .set_rf_gain(channel, tuner.rf_gain_range.clamp(channel_config.rf_gain_db))?;
            channel_config.bandwidth_hz = driver.set_bandwidth(
                channel,
                tuner.bandwidth_range.clamp(channel_config.bandwidth_hz),
            )?;
            channel_config.dc_offset =
                driver.set_dc_offset_mode(channel, channel_config.dc_offset)?;
        }

        if num_channels == 2 && config.channels[0].tuner_role == config.channels[1].tuner_role {
            return Err(SourceError::UnsupportedChannels(format!(
                "both channels map to {}",
                config.channels[0].tuner_role
            )));
        }

        Ok(Self {
            driver: Mutex::new(driver),
            config: Mutex::new(config),
            pending: Mutex::new(Vec::new()),
            state,
        })
    }

    pub(crate) fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.driver.lock().unwrap())
    }

    /// Snapshot of the applied configuration.
    pub fn config(&self) -> DeviceConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn num_channels(&self) -> usize {
        self.config.lock().unwrap().channels.len()
    }

    pub fn description(&self) -> String {
        self.driver.lock().unwrap().description()
    }

    fn ensure_channel(&self, channel: usize) -> Result<()> {
        let available = self.num_channels();
        if channel < available {
            Ok(())
        } else {
            Err(SourceError::InvalidChannel { channel, available })
        }
    }

    fn streaming(&self) -> bool {
        matches!(
            self.state.get(),
            SessionState::Started | SessionState::Running
        )
    }

    pub fn set_sample_rate(&self, rate_hz: f64) -> Result<f64> {
        let mut driver = self.driver.lock().unwrap();
        let clamped = driver.caps().sample_rate_range.clamp(rate_hz);
        let applied = driver.set_sample_rate(clamped)?;
        drop(driver);
        self.config.lock().unwrap().sample_rate_hz = applied;
        Ok(applied)
    }

    pub fn set_center_freq(&self, channel: usize, freq_hz: f64) -> Result<f64> {
        self.ensure_channel(channel)?;
        let mut driver = self.driver.lock().unwrap();
        let clamped = driver.caps().tuners[channel].freq_range.clamp(freq_hz);
        let applied = driver.set_center_freq(channel, clamped)?;
        drop(driver);
        self.config.lock().unwrap().channels[channel].center_freq_hz = applied;
        Ok(applied)
    }

    pub fn set_freq_corr(&self, channel: usize, ppm: f64) -> Result<f64> {
        self.ensure_channel(channel)?;
        let applied = self.with_driver(|driver| driver.set_freq_corr(channel, ppm))?;
        self.config.lock().unwrap().channels[channel].freq_corr_ppm = applied;
        Ok(applied)
    }

    /// Explicit gain overrides automatic mode: setting it switches the
    /// hardware AGC off first.
    pub fn set_if_gain(&self, channel: usize, gain_db: f64) -> Result<f64> {
        self.ensure_channel(channel)?;
        let mut driver = self.driver.lock().unwrap();
        if self.config.lock().unwrap().channels[channel].auto_gain {
            driver.set_gain_mode(channel, false)?;
        }
        let clamped = driver.caps().tuners[channel].if_gain_range.clamp(gain_db);
        let applied = driver.set_if_gain(channel, clamped)?;
        drop(driver);
        let mut config = self.config.lock().unwrap();
        config.channels[channel].auto_gain = false;
        config.channels[channel].if_gain_db = applied;
        Ok(applied)
    }

    /// Explicit gain overrides automatic mode, as for
    /// [`DeviceSession::set_if_gain`].
    pub fn set_rf_gain(&self, channel: usize, gain_db: f64) -> Result<f64> {
        self.ensure_channel(channel)?;
        let mut driver = self.driver.lock().unwrap();
        if self.config.lock().unwrap().channels[channel].auto_gain {
            driver.set_gain_mode(channel, false)?;
        }
        let clamped = driver.caps().tuners[channel].rf_gain_range.clamp(gain_db);
        let applied = driver.set_rf_gain(channel, clamped)?;
        drop(driver);
        let mut config = self.config.lock().unwrap();
        config.channels[channel].auto_gain = false;
        config.channels[channel].rf_gain_db = applied;
        Ok(applied)
    }

    /// Disabling automatic mode leaves the last recorded manual gains in
    /// force.
    pub fn set_gain_mode(&self, channel: usize, automatic: bool) -> Result<bool> {
        self.ensure_channel(channel)?;
        let applied = self.with_driver(|driver| driver.set_gain_mode(channel, automatic))?;
        self.config.lock().unwrap().channels[channel].auto_gain = applied;
        Ok(applied)
    }

    /// Select an antenna port for a channel.
    ///
    /// A change the hardware can apply live takes effect immediately.
    /// While streaming, a change the hardware documents as needing a
    /// capture restart is queued and applied at the next quiescent point;
    /// the returned name is the accepted, not-yet-active port, and the
    /// getter keeps reporting the active port until the change lands.
    pub fn set_antenna(&self, channel: usize, antenna: &str) -> Result<String> {
        self.ensure_channel(channel)?;
        let mut driver = self.driver.lock().unwrap();
        let port = driver
            .caps()
            .port(antenna)
            .ok_or_else(|| SourceError::UnknownAntenna(antenna.to_string()))?
            .clone();

        // In dual-channel mode the sibling's tuner is off limits
        let config = self.config.lock().unwrap();
        for (other, other_config) in config.channels.iter().enumerate() {
            if other != channel && other_config.tuner_role == port.role {
                return Err(SourceError::UnsupportedChannels(format!(
                    "{} already backs channel {}",
                    port.role, other
                )));
            }
        }
        drop(config);

        if self.streaming() && driver.antenna_requires_restart(channel, antenna) {
            drop(driver);
            let mut pending = self.pending.lock().unwrap();
            pending.retain(|change| change.channel != channel);
            pending.push(PendingModeChange {
                channel,
                antenna: antenna.to_string(),
            });
            log::info!(
                "Channel {}: antenna change to {:?} queued for next quiescent point",
                channel,
                antenna
            );
            return Ok(antenna.to_string());
        }

        let applied = driver.set_antenna(channel, antenna)?;
        drop(driver);
        let mut config = self.config.lock().unwrap();
        config.channels[channel].antenna = applied.clone();
        config.channels[channel].tuner_role = port.role;
        Ok(applied)
    }

    pub fn set_rf_notch(&self, channel: usize, enable: bool) -> Result<bool> {
        self.ensure_channel(channel)?;
        let applied = self.with_driver(|driver| driver.set_rf_notch(channel, enable))?;
        self.config.lock().unwrap().channels[channel].rf_notch = applied;
        Ok(applied)
    }

    pub fn set_dab_notch(&self, channel: usize, enable: bool) -> Result<bool> {
        self.ensure_channel(channel)?;
        let applied = self.with_driver(|driver| driver.set_dab_notch(channel, enable))?;
        self.config.lock().unwrap().channels[channel].dab_notch = applied;
        Ok(applied)
    }

    pub fn set_dc_offset_mode(&self, channel: usize, mode: DcOffsetMode) -> Result<DcOffsetMode> {
        self.ensure_channel(channel)?;
        let applied = self.with_driver(|driver| driver.set_dc_offset_mode(channel, mode))?;
        self.config.lock().unwrap().channels[channel].dc_offset = applied;
        Ok(applied)
    }

    pub fn set_bandwidth(&self, channel: usize, bw_hz: f64) -> Result<f64> {
        self.ensure_channel(channel)?;
        let mut driver = self.driver.lock().unwrap();
        let clamped = driver.caps().tuners[channel].bandwidth_range.clamp(bw_hz);
        let applied = driver.set_bandwidth(channel, clamped)?;
        drop(driver);
        self.config.lock().unwrap().channels[channel].bandwidth_hz = applied;
        Ok(applied)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().unwrap().is_empty()
    }

    /// Apply queued mode changes at a quiescent point (the pull thread,
    /// outside any callback). Each change tears down only its own
    /// channel's capture, switches the port while that channel is
    /// provably quiet, resets the gap baseline, and resumes; the fresh
    /// index sequence is therefore never reported as a discontinuity.
    pub(crate) fn apply_pending(&self, sink: &CallbackSink) -> Result<()> {
        let mut queued = std::mem::take(&mut *self.pending.lock().unwrap());

        while !queued.is_empty() {
            let change = queued.remove(0);
            let result = self.apply_one(sink, &change);
            if let Err(e) = result {
                // Put the unprocessed remainder back for the next pull
                self.pending.lock().unwrap().extend(queued);
                return Err(e);
            }
        }
        Ok(())
    }

    fn apply_one(&self, sink: &CallbackSink, change: &PendingModeChange) -> Result<()> {
        let mut driver = self.driver.lock().unwrap();
        let role = match driver.caps().port(&change.antenna) {
            Some(port) => port.role,
            None => return Ok(()),
        };

        driver.teardown_channel(change.channel)?;
        // No deliver can be in flight for this channel from here on
        let applied = driver.set_antenna(change.channel, &change.antenna)?;
        sink.reset_channel(change.channel);
        driver.resume_channel(change.channel)?;
        drop(driver);

        let mut config = self.config.lock().unwrap();
        config.channels[change.channel].antenna = applied;
        config.channels[change.channel].tuner_role = role;
        drop(config);

        sink.notify_mode_change(change.channel);
        log::info!(
            "Channel {}: tuner mode change applied ({})",
            change.channel,
            change.antenna
        );
        Ok(())
    }
}
