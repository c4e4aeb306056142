//! Domain-specific error types for test-selector

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the test-selector wizard and backend
#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The question tree could not be fetched or parsed. Fatal to the wizard.
    #[error("Tree load error: {message}")]
    TreeLoad { message: String },

    #[error("Invalid tree definition: {message}")]
    InvalidTree { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The resolution service answered but refused the answer path.
    #[error("Resolution failed: {message}")]
    Resolution { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Timeout error: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<anyhow::Error> for SelectorError {
    fn from(err: anyhow::Error) -> Self {
        SelectorError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SelectorError {
    fn from(err: serde_json::Error) -> Self {
        SelectorError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SelectorError {
    fn from(err: toml::de::Error) -> Self {
        SelectorError::Config {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SelectorError {
    fn from(err: std::io::Error) -> Self {
        SelectorError::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<reqwest::Error> for SelectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SelectorError::Serialization {
                message: format!("Malformed response body: {}", err),
            };
        }
        SelectorError::Transport {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl SelectorError {
    /// HTTP status used when this error crosses the backend boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            SelectorError::Validation { .. } | SelectorError::Resolution { .. } => {
                StatusCode::BAD_REQUEST
            }
            SelectorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            SelectorError::Transport { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert SelectorError into the `{success: false, error}` envelope
impl IntoResponse for SelectorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }
        (
            status,
            Json(json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// Result type alias for test-selector operations
pub type Result<T> = std::result::Result<T, SelectorError>;
