//! Error types for TrailCommand

use thiserror::Error;

/// Main error type for the TrailCommand library
#[derive(Error, Debug)]
pub enum TrailError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    StatusError { status: u16, body: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid auth code expiry: {0}")]
    InvalidExpiry(String),

    #[error("Realtime error: {0}")]
    RealtimeError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Hardware error: {0}")]
    HardwareError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrailError {
    /// HTTP status code carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TrailError::StatusError { status, .. } => Some(*status),
            TrailError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for TrailError {
    fn from(err: anyhow::Error) -> Self {
        TrailError::Internal(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TrailError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TrailError::RealtimeError(err.to_string())
    }
}
