//! Relay error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Relay error type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The subscriber connection is closed or its writer has exited.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The subscriber's outbound queue is full.
    #[error("Subscriber outbound queue is full")]
    SlowConsumer,

    /// The hook request body could not be read.
    #[error("Invalid request body: {0}")]
    Body(String),
}

impl From<tokio::sync::mpsc::error::TrySendError<axum::extract::ws::Message>> for RelayError {
    fn from(err: tokio::sync::mpsc::error::TrySendError<axum::extract::ws::Message>) -> Self {
        match err {
            tokio::sync::mpsc::error::TrySendError::Full(_) => RelayError::SlowConsumer,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => RelayError::ConnectionClosed,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::Body(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
