//! # Error Types
//!
//! Custom error types for Pulse Monitor using `thiserror`.
//!
//! None of these are fatal inside the ingestion core: transport errors end in a
//! scheduled reconnect and payload errors drop a single message.

use thiserror::Error;

/// Main error type for Pulse Monitor
#[derive(Debug, Error)]
pub enum PulseError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection refused, socket error, abnormal close or connect timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// Telemetry payload could not be turned into a reading
    #[error("Payload error: {0}")]
    Payload(String),

    /// Wire framing (Socket.IO / Engine.IO) errors
    #[error("Frame error: {0}")]
    Frame(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for PulseError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        PulseError::Transport(e.to_string())
    }
}

/// Result type alias for Pulse Monitor
pub type Result<T> = std::result::Result<T, PulseError>;
