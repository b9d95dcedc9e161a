pub mod bridge;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod hal;
pub mod lifecycle;
pub mod session;
pub mod source;
pub mod stream;

#[cfg(feature = "mock")]
pub mod mock;

pub use config::{ChannelConfig, DcOffsetMode, DeviceConfig, Frequency, TunerRole};
pub use error::{Result, SourceError};
pub use events::SourceEvent;
pub use lifecycle::SessionState;
pub use source::IqSource;
