//! Ledger error types.

use thiserror::Error;

/// Ledger error type.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the backend
    #[error("{operation} failed with status {status} ({body_summary})")]
    Status {
        operation: String,
        status: reqwest::StatusCode,
        body_summary: String,
    },

    /// Sign-in or refresh rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Unexpected realtime protocol message
    #[error("Realtime protocol error: {0}")]
    Protocol(String),

    /// Malformed endpoint URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias using LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;
