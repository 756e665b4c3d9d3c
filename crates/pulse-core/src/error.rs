//! Error types
//!
//! Centralized error type for the Pulse crates, built on `thiserror`.

use thiserror::Error;

/// Pulse-wide error type
///
/// Covers the failures that leave a server or subscriber unable to run.
/// Per-connection failures (a producer error, a closed stream, a dropped
/// transport) are recovered locally and never become a `PulseError`.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to bind the listening socket
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP server error
    #[error("Server error: {0}")]
    Server(String),

    /// Failed to build the HTTP client
    #[error("HTTP client error: {0}")]
    Client(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PulseError>;

impl From<PulseError> for String {
    fn from(error: PulseError) -> String {
        error.to_string()
    }
}
