//! Interface presented by the vendor radio layer.
//!
//! The vendor SDK itself is out of scope; these traits capture exactly
//! the calls the core makes into it and the callbacks it receives back.
//! Real hardware wraps the vendor library behind [`RadioDriver`]; tests
//! and demos use the `mock` feature's implementation.

use std::sync::Arc;

use crate::config::{DcOffsetMode, TunerRole};
use crate::error::Result;

/// Closed range of valid values for one hardware parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub fn new(min: f64, max: f64) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }

    /// Nearest in-range value to `value`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// One selectable antenna port and the physical tuner behind it.
#[derive(Debug, Clone)]
pub struct AntennaPort {
    pub name: String,
    pub role: TunerRole,
}

/// Capability ranges reported by the hardware for one tuner.
#[derive(Debug, Clone)]
pub struct TunerCaps {
    pub freq_range: ParamRange,
    pub if_gain_range: ParamRange,
    pub rf_gain_range: ParamRange,
    pub bandwidth_range: ParamRange,
    pub antennas: Vec<AntennaPort>,
}

/// Capability ranges for a whole device.
#[derive(Debug, Clone)]
pub struct DeviceCaps {
    pub sample_rate_range: ParamRange,
    pub tuners: Vec<TunerCaps>,
}

impl DeviceCaps {
    /// Look up an antenna port by name across all tuners.
    pub fn port(&self, name: &str) -> Option<&AntennaPort> {
        self.tuners
            .iter()
            .flat_map(|t| t.antennas.iter())
            .find(|p| p.name == name)
    }
}

/// Receives sample chunks and hardware notifications on the driver's
/// callback thread. Implementations must return promptly; a callback
/// that overruns its deadline risks additional drops in the hardware.
pub trait StreamSink: Send + Sync {
    /// One callback's worth of samples: parallel I and Q arrays of equal
    /// length plus the running index of the first sample in the chunk.
    fn deliver(&self, channel: usize, i: &[i16], q: &[i16], first_index: u64);

    /// Asynchronous ADC overload notification.
    fn overload(&self, channel: usize);
}

/// Outbound surface of the vendor driver for one opened device.
///
/// Setters return the value the hardware actually applied, which may be
/// quantized relative to the request. All setters are live-safe while
/// streaming except antenna changes for which
/// [`RadioDriver::antenna_requires_restart`] returns true.
pub trait RadioDriver: Send {
    /// Human-readable descriptor of the opened device.
    fn description(&self) -> String;

    fn caps(&self) -> &DeviceCaps;

    fn set_sample_rate(&mut self, rate_hz: f64) -> Result<f64>;
    fn set_center_freq(&mut self, channel: usize, freq_hz: f64) -> Result<f64>;
    fn set_freq_corr(&mut self, channel: usize, ppm: f64) -> Result<f64>;
    fn set_if_gain(&mut self, channel: usize, gain_db: f64) -> Result<f64>;
    fn set_rf_gain(&mut self, channel: usize, gain_db: f64) -> Result<f64>;
    fn set_gain_mode(&mut self, channel: usize, automatic: bool) -> Result<bool>;
    fn set_antenna(&mut self, channel: usize, antenna: &str) -> Result<String>;
    fn set_rf_notch(&mut self, channel: usize, enable: bool) -> Result<bool>;
    fn set_dab_notch(&mut self, channel: usize, enable: bool) -> Result<bool>;
    fn set_dc_offset_mode(&mut self, channel: usize, mode: DcOffsetMode) -> Result<DcOffsetMode>;
    fn set_bandwidth(&mut self, channel: usize, bw_hz: f64) -> Result<f64>;

    /// Whether switching `channel` to `antenna` needs a capture restart
    /// instead of a live update.
    fn antenna_requires_restart(&self, channel: usize, antenna: &str) -> bool;

    /// Register the sink and begin delivering chunks for `channels`
    /// logical channels from the driver's own thread(s).
    fn start_stream(&mut self, sink: Arc<dyn StreamSink>, channels: usize) -> Result<()>;

    /// Stop deliveries. Must not return while a `deliver` call is still
    /// in flight.
    fn stop_stream(&mut self) -> Result<()>;

    /// Tear down only `channel`'s capture context. Must not return while
    /// a `deliver` call for that channel is still in flight; sibling
    /// channels keep streaming throughout.
    fn teardown_channel(&mut self, channel: usize) -> Result<()>;

    /// Resume delivery on a torn-down channel with a fresh sample-index
    /// baseline.
    fn resume_channel(&mut self, channel: usize) -> Result<()>;

    /// Release the hardware. Idempotent.
    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_range_clamp() {
        let range = ParamRange::new(2e6, 10e6);
        assert_eq!(range.clamp(12e6), 10e6);
        assert_eq!(range.clamp(1e6), 2e6);
        assert_eq!(range.clamp(5e6), 5e6);
    }

    #[test]
    fn test_param_range_contains() {
        let range = ParamRange::new(0.0, 59.0);
        assert!(range.contains(0.0));
        assert!(range.contains(59.0));
        assert!(!range.contains(59.1));
    }
}
