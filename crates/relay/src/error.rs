//! Relay error types.

use thiserror::Error;

/// Relay error type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inbound payload parsed but did not match the expected shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Client not found.
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// Channel send error.
    #[error("Channel send error")]
    ChannelSend,
}

impl From<tokio::sync::mpsc::error::SendError<axum::extract::ws::Message>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<axum::extract::ws::Message>) -> Self {
        RelayError::ChannelSend
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
