use thiserror::Error;

use crate::lifecycle::SessionState;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device open failed: {0}")]
    Open(String),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Unsupported channel combination: {0}")]
    UnsupportedChannels(String),

    #[error("Channel {channel} out of range: device session has {available}")]
    InvalidChannel { channel: usize, available: usize },

    #[error("{operation} not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Unknown antenna: {0}")]
    UnknownAntenna(String),

    #[error("Configuration rejected by hardware: {0}")]
    ConfigRejected(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;
