pub mod gap;
pub mod ring;
pub mod sink;

pub use gap::{Continuity, GapTracker};
pub use ring::{DeliverOutcome, SampleBridge};
pub use sink::{CallbackSink, ChannelStats};
