//! Error types for the log viewer

use thiserror::Error;

/// Main error type for log retrieval and tailing
#[derive(Error, Debug)]
pub enum LogsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Quota error: {0}")]
    QuotaError(String),

    #[error("Stream protocol violation: {0}")]
    Protocol(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Tail start {tail_start} does not match history window end {window_end}")]
    Misaligned {
        window_end: String,
        tail_start: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for LogsError {
    fn from(err: anyhow::Error) -> Self {
        LogsError::Internal(err.to_string())
    }
}
