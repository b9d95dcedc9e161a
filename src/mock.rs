//! Hardware-free driver for tests and demos.
//!
//! Implements [`RadioDriver`] with capability tables modeled on a real
//! RSP-class receiver family: a single-tuner variant and a dual-tuner
//! variant whose antenna ports are pinned to physical tuners. Producer
//! threads deliver a paced test tone with a monotonically increasing
//! sample index, so the full callback/pull bridge is exercised without
//! hardware.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{DcOffsetMode, TunerRole};
use crate::error::{Result, SourceError};
use crate::hal::{AntennaPort, DeviceCaps, ParamRange, RadioDriver, StreamSink, TunerCaps};

/// Samples per delivered chunk.
pub const CHUNK_SAMPLES: usize = 1024;

const TONE_HZ: f64 = 1000.0;
const TONE_AMPLITUDE: f64 = 0.5;

/// Selector strings accepted by [`MockRadio::open`].
pub fn devices() -> Vec<String> {
    vec!["mock=single".to_string(), "mock=duo".to_string()]
}

struct ChannelWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ChannelWorker {
    fn finish(self) {
        self.stop.store(true, Ordering::Release);
        // Join fences against an in-flight deliver
        let _ = self.handle.join();
    }
}

pub struct MockRadio {
    label: String,
    caps: DeviceCaps,
    dual: bool,
    sample_rate_hz: f64,
    channel_antennas: Vec<String>,
    sink: Option<Arc<dyn StreamSink>>,
    workers: Vec<Option<ChannelWorker>>,
    closed: bool,
}

impl MockRadio {
    /// Single-tuner device with two live-switchable antenna ports.
    pub fn single() -> Self {
        let tuner = TunerCaps {
            freq_range: ParamRange::new(1e3, 2e9),
            if_gain_range: ParamRange::new(20.0, 59.0),
            rf_gain_range: ParamRange::new(0.0, 9.0),
            bandwidth_range: ParamRange::new(200e3, 8e6),
            antennas: vec![
                AntennaPort {
                    name: "Antenna A".to_string(),
                    role: TunerRole::A,
                },
                AntennaPort {
                    name: "Antenna B".to_string(),
                    role: TunerRole::A,
                },
            ],
        };
        Self::with_caps(
            "Mock RSP (single tuner)",
            DeviceCaps {
                sample_rate_range: ParamRange::new(2e6, 10e6),
                tuners: vec![tuner],
            },
            false,
        )
    }

    /// Dual-tuner device. Every port change needs a capture restart on
    /// its tuner, and the 50-ohm ports are pinned one per tuner.
    pub fn duo() -> Self {
        let tuner_a = TunerCaps {
            freq_range: ParamRange::new(1e3, 2e9),
            if_gain_range: ParamRange::new(20.0, 59.0),
            rf_gain_range: ParamRange::new(0.0, 9.0),
            bandwidth_range: ParamRange::new(200e3, 8e6),
            antennas: vec![
                AntennaPort {
                    name: "Tuner 1 50 ohm".to_string(),
                    role: TunerRole::A,
                },
                AntennaPort {
                    name: "High-Z".to_string(),
                    role: TunerRole::A,
                },
            ],
        };
        let tuner_b = TunerCaps {
            freq_range: ParamRange::new(1e3, 2e9),
            if_gain_range: ParamRange::new(20.0, 59.0),
            rf_gain_range: ParamRange::new(0.0, 9.0),
            bandwidth_range: ParamRange::new(200e3, 8e6),
            antennas: vec![AntennaPort {
                name: "Tuner 2 50 ohm".to_string(),
                role: TunerRole::B,
            }],
        };
        Self::with_caps(
            "Mock RSPduo (dual tuner)",
            DeviceCaps {
                sample_rate_range: ParamRange::new(2e6, 10e6),
                tuners: vec![tuner_a, tuner_b],
            },
            true,
        )
    }

    fn with_caps(label: &str, caps: DeviceCaps, dual: bool) -> Self {
        let channel_antennas = caps
            .tuners
            .iter()
            .map(|t| t.antennas[0].name.clone())
            .collect();
        let workers = caps.tuners.iter().map(|_| None).collect();
        Self {
            label: label.to_string(),
            caps,
            dual,
            sample_rate_hz: 2e6,
            channel_antennas,
            sink: None,
            workers,
            closed: false,
        }
    }

    /// Open a device by selector string, as enumerated by [`devices`].
    pub fn open(selector: &str) -> Result<Self> {
        match selector {
            "" | "mock" | "mock=single" => Ok(Self::single()),
            "mock=duo" => Ok(Self::duo()),
            other => Err(SourceError::DeviceNotFound(other.to_string())),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SourceError::Hardware("device is closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn ensure_channel(&self, channel: usize) -> Result<()> {
        if channel < self.caps.tuners.len() {
            Ok(())
        } else {
            Err(SourceError::InvalidChannel {
                channel,
                available: self.caps.tuners.len(),
            })
        }
    }

    fn spawn_worker(&self, channel: usize) -> Result<ChannelWorker> {
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| SourceError::Hardware("stream not started".to_string()))?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let sample_rate_hz = self.sample_rate_hz;
        let handle = std::thread::spawn(move || {
            stream_channel(channel, sink, stop_flag, sample_rate_hz);
        });
        Ok(ChannelWorker { stop, handle })
    }
}

/// Paced tone generator standing in for one tuner's capture context.
/// Sample indices start at zero and increase by the chunk length, so a
/// restart looks exactly like a hardware re-init.
fn stream_channel(
    channel: usize,
    sink: Arc<dyn StreamSink>,
    stop: Arc<AtomicBool>,
    sample_rate_hz: f64,
) {
    let period = Duration::from_secs_f64(CHUNK_SAMPLES as f64 / sample_rate_hz);
    let phase_step = TAU * TONE_HZ / sample_rate_hz;
    let mut phase = 0.0f64;
    let mut first_index = 0u64;
    let mut i = [0i16; CHUNK_SAMPLES];
    let mut q = [0i16; CHUNK_SAMPLES];

    while !stop.load(Ordering::Acquire) {
        for k in 0..CHUNK_SAMPLES {
            i[k] = (TONE_AMPLITUDE * f64::from(i16::MAX) * phase.cos()) as i16;
            q[k] = (TONE_AMPLITUDE * f64::from(i16::MAX) * phase.sin()) as i16;
            phase += phase_step;
            if phase >= TAU {
                phase -= TAU;
            }
        }
        sink.deliver(channel, &i, &q, first_index);
        first_index += CHUNK_SAMPLES as u64;
        std::thread::sleep(period);
    }
}

impl RadioDriver for MockRadio {
    fn description(&self) -> String {
        self.label.clone()
    }

    fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    fn set_sample_rate(&mut self, rate_hz: f64) -> Result<f64> {
        self.ensure_open()?;
        if !self.caps.sample_rate_range.contains(rate_hz) {
            return Err(SourceError::ConfigRejected(format!(
                "sample rate {} Hz outside device range",
                rate_hz
            )));
        }
        self.sample_rate_hz = rate_hz;
        Ok(rate_hz)
    }

    fn set_center_freq(&mut self, channel: usize, freq_hz: f64) -> Result<f64> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        Ok(freq_hz)
    }

    fn set_freq_corr(&mut self, channel: usize, ppm: f64) -> Result<f64> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        Ok(ppm)
    }

    fn set_if_gain(&mut self, channel: usize, gain_db: f64) -> Result<f64> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        // The IF stage steps in whole dB
        Ok(gain_db.round())
    }

    fn set_rf_gain(&mut self, channel: usize, gain_db: f64) -> Result<f64> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        Ok(gain_db.round())
    }

    fn set_gain_mode(&mut self, channel: usize, automatic: bool) -> Result<bool> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        Ok(automatic)
    }

    fn set_antenna(&mut self, channel: usize, antenna: &str) -> Result<String> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        if self.caps.port(antenna).is_none() {
            return Err(SourceError::UnknownAntenna(antenna.to_string()));
        }
        self.channel_antennas[channel] = antenna.to_string();
        Ok(antenna.to_string())
    }

    fn set_rf_notch(&mut self, channel: usize, enable: bool) -> Result<bool> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        Ok(enable)
    }

    fn set_dab_notch(&mut self, channel: usize, enable: bool) -> Result<bool> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        Ok(enable)
    }

    fn set_dc_offset_mode(&mut self, channel: usize, mode: DcOffsetMode) -> Result<DcOffsetMode> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        Ok(mode)
    }

    fn set_bandwidth(&mut self, channel: usize, bw_hz: f64) -> Result<f64> {
        self.ensure_open()?;
        self.ensure_channel(channel)?;
        Ok(bw_hz)
    }

    fn antenna_requires_restart(&self, channel: usize, antenna: &str) -> bool {
        // Dual-tuner port switches re-init the affected tuner; the
        // single-tuner variant switches ports live
        self.dual
            && self
                .channel_antennas
                .get(channel)
                .is_some_and(|current| current != antenna)
    }

    fn start_stream(&mut self, sink: Arc<dyn StreamSink>, channels: usize) -> Result<()> {
        self.ensure_open()?;
        if self.workers.iter().any(|w| w.is_some()) {
            return Err(SourceError::Hardware("stream already active".to_string()));
        }
        if channels > self.caps.tuners.len() {
            return Err(SourceError::UnsupportedChannels(format!(
                "{} channel(s) requested, device has {}",
                channels,
                self.caps.tuners.len()
            )));
        }
        self.sink = Some(sink);
        for channel in 0..channels {
            let worker = self.spawn_worker(channel)?;
            self.workers[channel] = Some(worker);
        }
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        for worker in self.workers.iter_mut() {
            if let Some(worker) = worker.take() {
                worker.finish();
            }
        }
        self.sink = None;
        Ok(())
    }

    fn teardown_channel(&mut self, channel: usize) -> Result<()> {
        self.ensure_channel(channel)?;
        if let Some(worker) = self.workers[channel].take() {
            worker.finish();
        }
        Ok(())
    }

    fn resume_channel(&mut self, channel: usize) -> Result<()> {
        self.ensure_channel(channel)?;
        if self.workers[channel].is_some() {
            return Err(SourceError::Hardware(format!(
                "channel {} capture already active",
                channel
            )));
        }
        let worker = self.spawn_worker(channel)?;
        self.workers[channel] = Some(worker);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop_stream()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for MockRadio {
    fn drop(&mut self) {
        let _ = self.stop_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_selectors() {
        assert!(MockRadio::open("mock=single").is_ok());
        assert!(MockRadio::open("mock=duo").is_ok());
        assert!(matches!(
            MockRadio::open("rsp1a=0"),
            Err(SourceError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_duo_roles_are_distinct() {
        let radio = MockRadio::duo();
        let caps = radio.caps();
        assert_eq!(caps.tuners.len(), 2);
        assert_eq!(caps.port("Tuner 1 50 ohm").unwrap().role, TunerRole::A);
        assert_eq!(caps.port("Tuner 2 50 ohm").unwrap().role, TunerRole::B);
        assert_eq!(caps.port("High-Z").unwrap().role, TunerRole::A);
    }

    #[test]
    fn test_restart_policy() {
        let single = MockRadio::single();
        assert!(!single.antenna_requires_restart(0, "Antenna B"));

        let duo = MockRadio::duo();
        assert!(duo.antenna_requires_restart(0, "High-Z"));
        assert!(!duo.antenna_requires_restart(0, "Tuner 1 50 ohm"));
    }

    #[test]
    fn test_setters_fail_after_close() {
        let mut radio = MockRadio::single();
        radio.close().unwrap();
        assert!(radio.set_sample_rate(2e6).is_err());
        // close is idempotent
        radio.close().unwrap();
    }
}
