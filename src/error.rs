//! Error types for the Aria edge client

use thiserror::Error;

/// Result type alias for edge client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the edge client
///
/// None of these are fatal to the running agent: connect and send failures
/// are absorbed by the reconnection supervisor, protocol errors cause the
/// offending frame to be skipped, and device errors degrade to best-effort.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport could not be reached
    #[error("connect failed: {0}")]
    Connect(String),

    /// Write on an open transport failed
    #[error("send failed: {0}")]
    Send(String),

    /// Malformed wire message (invalid JSON or missing required fields)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unparseable interaction state name
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Audio device error (capture, playback, mute)
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word scoring error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
