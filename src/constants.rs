//! Numeric constants for the sample path.

/// Scale applied when converting 16-bit hardware samples to normalized
/// complex floats. Full-scale i16 maps to just under +/-1.0.
pub const SAMPLE_SCALE: f32 = 1.0 / 32768.0;

/// Smallest per-channel ring capacity allocated at stream start, in
/// complex samples. Low sample rates still get headroom for several
/// callback chunks between pulls.
pub const MIN_RING_CAPACITY: usize = 65_536;

/// Ring capacity divisor relative to the sample rate. One eighth of a
/// second of samples covers the worst-case consumer scheduling interval
/// the bridge must absorb without dropping.
pub const RING_RATE_DIVISOR: usize = 8;

/// Depth of the event queue between the callback thread and the consumer.
/// Beyond this the callback drops events rather than blocking.
pub const EVENT_QUEUE_DEPTH: usize = 64;
