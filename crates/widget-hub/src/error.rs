//! Hub Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Error, Debug)]
pub enum HubError {
    /// Write to a client connection failed
    #[error("Client write failed: {0}")]
    Write(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client did not accept a write within the write timeout
    #[error("Client write timed out")]
    WriteTimeout,

    /// The event channel is at capacity
    #[error("Event channel full")]
    ChannelFull,

    /// The broadcast worker has stopped
    #[error("Event channel closed")]
    ChannelClosed,
}
