//! Pull-side conversion from buffered 16-bit I/Q to normalized complex.

use std::sync::Arc;

use num_complex::Complex32;

use crate::bridge::CallbackSink;
use crate::constants::SAMPLE_SCALE;
use crate::error::{Result, SourceError};

/// Drains the bridges on the consumer's cadence.
///
/// Owns reusable scratch buffers so a steady-state pull does not
/// allocate. Never waits on the callback thread: an empty ring is an
/// immediate zero-count return.
pub struct StreamEngine {
    sink: Arc<CallbackSink>,
    scratch_i: Vec<i16>,
    scratch_q: Vec<i16>,
}

impl StreamEngine {
    pub(crate) fn new(sink: Arc<CallbackSink>) -> Self {
        Self {
            sink,
            scratch_i: Vec::new(),
            scratch_q: Vec::new(),
        }
    }

    /// Copy up to `out.len()` samples for `channel` into `out`, scaled
    /// to the unit circle. Returns the count produced; 0 means nothing
    /// buffered this cycle, try again on the next.
    pub fn pull(&mut self, channel: usize, out: &mut [Complex32]) -> Result<usize> {
        let bridge = self
            .sink
            .bridge(channel)
            .cloned()
            .ok_or(SourceError::InvalidChannel {
                channel,
                available: self.sink.num_channels(),
            })?;

        let want = out.len();
        if self.scratch_i.len() < want {
            self.scratch_i.resize(want, 0);
            self.scratch_q.resize(want, 0);
        }

        let count = bridge.drain(&mut self.scratch_i[..want], &mut self.scratch_q[..want]);
        for k in 0..count {
            out[k] = Complex32::new(
                self.scratch_i[k] as f32 * SAMPLE_SCALE,
                self.scratch_q[k] as f32 * SAMPLE_SCALE,
            );
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;

    use super::*;
    use crate::events::event_queue;
    use crate::hal::StreamSink;
    use crate::lifecycle::{SessionState, StateCell};

    fn engine_with_sink() -> (StreamEngine, Arc<CallbackSink>) {
        let (tx, _rx) = event_queue();
        let state = Arc::new(StateCell::new(SessionState::Started));
        let sink = Arc::new(CallbackSink::new(1, 4096, tx, state));
        (StreamEngine::new(sink.clone()), sink)
    }

    #[test]
    fn test_pull_scales_to_unit_range() {
        let (mut engine, sink) = engine_with_sink();
        sink.deliver(0, &[i16::MAX, 0, i16::MIN], &[0, i16::MIN, i16::MAX], 0);

        let mut out = [Complex32::default(); 8];
        let produced = engine.pull(0, &mut out).unwrap();
        assert_eq!(produced, 3);
        assert_relative_eq!(out[0].re, 32767.0 / 32768.0);
        assert_relative_eq!(out[0].im, 0.0);
        assert_relative_eq!(out[1].im, -1.0);
        assert_relative_eq!(out[2].re, -1.0);
    }

    #[test]
    fn test_pull_empty_returns_zero() {
        let (mut engine, _sink) = engine_with_sink();
        let mut out = [Complex32::default(); 16];
        assert_eq!(engine.pull(0, &mut out).unwrap(), 0);
    }

    #[test]
    fn test_pull_caps_at_requested_count() {
        let (mut engine, sink) = engine_with_sink();
        let i = [100i16; 50];
        let q = [-100i16; 50];
        sink.deliver(0, &i, &q, 0);

        let mut out = [Complex32::default(); 20];
        assert_eq!(engine.pull(0, &mut out).unwrap(), 20);
        // Remainder stays buffered for the next cycle
        assert_eq!(engine.pull(0, &mut out).unwrap(), 20);
        assert_eq!(engine.pull(0, &mut out).unwrap(), 10);
        assert_eq!(engine.pull(0, &mut out).unwrap(), 0);
    }

    #[test]
    fn test_pull_unknown_channel_is_error() {
        let (mut engine, _sink) = engine_with_sink();
        let mut out = [Complex32::default(); 4];
        assert!(matches!(
            engine.pull(2, &mut out),
            Err(SourceError::InvalidChannel { .. })
        ));
    }
}
