//! Bounded single-producer/single-consumer I/Q sample ring.
//!
//! The hardware callback writes fixed-size chunks on its own thread; the
//! consumer drains on its pull cadence. The two sides meet only at one
//! mutex, held for the copy and cursor update and nothing else.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Result of one `deliver` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverOutcome {
    /// Samples copied into the ring.
    pub accepted: usize,
    /// Newest samples discarded for lack of capacity.
    pub dropped: usize,
    /// True when this call began an overflow episode.
    pub overflow_started: bool,
}

struct RingState {
    i: Box<[i16]>,
    q: Box<[i16]>,
    read: usize,
    len: usize,
    in_overflow: bool,
    delivered: u64,
    dropped: u64,
}

/// Hands callback-sized chunks to a puller as one continuous stream.
///
/// The producer never overwrites samples the consumer has not read:
/// when space runs out the newest excess is dropped and the episode is
/// reported through [`DeliverOutcome`]. An episode ends at the next
/// deliver accepted in full, so a sustained stall raises one report,
/// not one per chunk.
pub struct SampleBridge {
    state: Mutex<RingState>,
    readable: Condvar,
    capacity: usize,
}

impl SampleBridge {
    /// Allocate a ring holding `capacity` complex samples. The capacity
    /// is fixed for the life of the bridge.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be nonzero");
        Self {
            state: Mutex::new(RingState {
                i: vec![0; capacity].into_boxed_slice(),
                q: vec![0; capacity].into_boxed_slice(),
                read: 0,
                len: 0,
                in_overflow: false,
                delivered: 0,
                dropped: 0,
            }),
            readable: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy one chunk in. Callback thread only.
    pub fn deliver(&self, i: &[i16], q: &[i16]) -> DeliverOutcome {
        debug_assert_eq!(i.len(), q.len());
        let mut state = self.state.lock().unwrap();

        let free = self.capacity - state.len;
        let accepted = i.len().min(free);
        let write = (state.read + state.len) % self.capacity;
        copy_in(&mut state.i, write, &i[..accepted], self.capacity);
        copy_in(&mut state.q, write, &q[..accepted], self.capacity);
        state.len += accepted;
        state.delivered += accepted as u64;

        let dropped = i.len() - accepted;
        state.dropped += dropped as u64;
        let overflow_started = dropped > 0 && !state.in_overflow;
        state.in_overflow = dropped > 0;
        drop(state);

        if accepted > 0 {
            self.readable.notify_one();
        }
        DeliverOutcome {
            accepted,
            dropped,
            overflow_started,
        }
    }

    /// Copy up to `out_i.len()` samples out, oldest first. Pull thread
    /// only; returns 0 immediately when nothing is buffered.
    pub fn drain(&self, out_i: &mut [i16], out_q: &mut [i16]) -> usize {
        debug_assert_eq!(out_i.len(), out_q.len());
        let mut state = self.state.lock().unwrap();

        let count = out_i.len().min(state.len);
        copy_out(&state.i, state.read, &mut out_i[..count], self.capacity);
        copy_out(&state.q, state.read, &mut out_q[..count], self.capacity);
        state.read = (state.read + count) % self.capacity;
        state.len -= count;
        count
    }

    /// Block for at most `timeout` until samples are buffered; returns
    /// the count available. Never used on the callback path.
    pub fn wait_available(&self, timeout: Duration) -> usize {
        let state = self.state.lock().unwrap();
        if state.len > 0 {
            return state.len;
        }
        let (state, _) = self.readable.wait_timeout(state, timeout).unwrap();
        state.len
    }

    /// Samples currently buffered.
    pub fn available(&self) -> usize {
        self.state.lock().unwrap().len
    }

    /// Total samples accepted since construction.
    pub fn delivered(&self) -> u64 {
        self.state.lock().unwrap().delivered
    }

    /// Total samples dropped to overflow since construction.
    pub fn dropped(&self) -> u64 {
        self.state.lock().unwrap().dropped
    }
}

fn copy_in(ring: &mut [i16], at: usize, src: &[i16], capacity: usize) {
    let first = src.len().min(capacity - at);
    ring[at..at + first].copy_from_slice(&src[..first]);
    ring[..src.len() - first].copy_from_slice(&src[first..]);
}

fn copy_out(ring: &[i16], at: usize, dst: &mut [i16], capacity: usize) {
    let first = dst.len().min(capacity - at);
    let rest = dst.len() - first;
    dst[..first].copy_from_slice(&ring[at..at + first]);
    dst[first..].copy_from_slice(&ring[..rest]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: i16, len: usize) -> (Vec<i16>, Vec<i16>) {
        let i: Vec<i16> = (start..start + len as i16).collect();
        let q: Vec<i16> = i.iter().map(|v| -v).collect();
        (i, q)
    }

    #[test]
    fn test_roundtrip_preserves_order_and_pairing() {
        let bridge = SampleBridge::new(64);
        let (i, q) = chunk(1, 10);
        let outcome = bridge.deliver(&i, &q);
        assert_eq!(outcome.accepted, 10);
        assert_eq!(outcome.dropped, 0);

        let mut out_i = [0i16; 10];
        let mut out_q = [0i16; 10];
        assert_eq!(bridge.drain(&mut out_i, &mut out_q), 10);
        assert_eq!(&out_i[..], &i[..]);
        assert_eq!(&out_q[..], &q[..]);
    }

    #[test]
    fn test_drain_empty_returns_zero() {
        let bridge = SampleBridge::new(16);
        let mut out_i = [0i16; 8];
        let mut out_q = [0i16; 8];
        assert_eq!(bridge.drain(&mut out_i, &mut out_q), 0);
    }

    #[test]
    fn test_partial_drain_then_refill_wraps() {
        let bridge = SampleBridge::new(8);
        let (i, q) = chunk(1, 6);
        bridge.deliver(&i, &q);

        let mut out_i = [0i16; 4];
        let mut out_q = [0i16; 4];
        assert_eq!(bridge.drain(&mut out_i, &mut out_q), 4);
        assert_eq!(&out_i[..], &[1, 2, 3, 4]);

        // Write crosses the physical end of the ring
        let (i2, q2) = chunk(7, 5);
        let outcome = bridge.deliver(&i2, &q2);
        assert_eq!(outcome.accepted, 5);

        let mut out_i = [0i16; 7];
        let mut out_q = [0i16; 7];
        assert_eq!(bridge.drain(&mut out_i, &mut out_q), 7);
        assert_eq!(&out_i[..], &[5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(&out_q[..], &[-5, -6, -7, -8, -9, -10, -11]);
    }

    #[test]
    fn test_overflow_drops_newest_and_reports_once() {
        let bridge = SampleBridge::new(1000);
        let (i, q) = chunk(0, 500);

        assert!(!bridge.deliver(&i, &q).overflow_started);
        assert!(!bridge.deliver(&i, &q).overflow_started);

        // Third chunk has nowhere to go
        let third = bridge.deliver(&i, &q);
        assert_eq!(third.accepted, 0);
        assert_eq!(third.dropped, 500);
        assert!(third.overflow_started);

        // Still the same episode
        let fourth = bridge.deliver(&i, &q);
        assert_eq!(fourth.dropped, 500);
        assert!(!fourth.overflow_started);

        // The first 1000 delivered samples survive untouched
        let mut out_i = vec![0i16; 1500];
        let mut out_q = vec![0i16; 1500];
        assert_eq!(bridge.drain(&mut out_i, &mut out_q), 1000);
        assert_eq!(&out_i[..500], &i[..]);
        assert_eq!(&out_i[500..1000], &i[..]);
    }

    #[test]
    fn test_overflow_episode_ends_after_full_accept() {
        let bridge = SampleBridge::new(100);
        let (i, q) = chunk(0, 80);

        bridge.deliver(&i, &q);
        assert!(bridge.deliver(&i, &q).overflow_started);

        // Free space, next full accept closes the episode
        let mut out_i = vec![0i16; 100];
        let mut out_q = vec![0i16; 100];
        bridge.drain(&mut out_i, &mut out_q);
        assert!(!bridge.deliver(&i, &q).overflow_started);

        // A fresh stall is a fresh episode
        assert!(bridge.deliver(&i, &q).overflow_started);
    }

    #[test]
    fn test_drained_never_exceeds_delivered() {
        let bridge = SampleBridge::new(256);
        let mut total_in = 0u64;
        let mut total_out = 0u64;
        let (i, q) = chunk(0, 100);
        let mut out_i = [0i16; 64];
        let mut out_q = [0i16; 64];

        for _ in 0..50 {
            total_in += bridge.deliver(&i, &q).accepted as u64;
            total_out += bridge.drain(&mut out_i, &mut out_q) as u64;
            assert!(total_out <= total_in);
        }
        assert_eq!(bridge.delivered(), total_in);
    }

    #[test]
    fn test_wait_available_times_out_when_empty() {
        let bridge = SampleBridge::new(16);
        assert_eq!(bridge.wait_available(Duration::from_millis(10)), 0);
    }

    #[test]
    fn test_wait_available_sees_delivery() {
        use std::sync::Arc;

        let bridge = Arc::new(SampleBridge::new(64));
        let writer = bridge.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            let (i, q) = chunk(1, 8);
            writer.deliver(&i, &q);
        });
        let available = bridge.wait_available(Duration::from_secs(2));
        handle.join().unwrap();
        assert!(available > 0);
    }
}
