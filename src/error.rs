//! Error types for Aigis Pulse

use thiserror::Error;

/// Errors that can occur at the edges of the aggregation engine.
///
/// The aggregator itself never fails; these surface from parsing inbound
/// signals, loading configuration, and talking to storage or remote services.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pattern service is not running")]
    ServiceStopped,
}

/// Failures reading or writing the key-value pattern store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored value is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Stored document is not a JSON object")]
    NotAnObject,
}

/// Failures contacting the remote classification or monitoring backends
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Remote service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Unexpected response: {0}")]
    BadResponse(String),
}
