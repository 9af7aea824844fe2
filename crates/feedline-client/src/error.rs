//! Error types for the feed API client

use thiserror::Error;

/// Coarse failure category shared by every layer of the client.
///
/// Callers decide how to react from the kind alone: fix the input,
/// send the user back to login, show a notice, or report the outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or empty input, corrected locally and never retried
    Validation,
    /// Bad credentials, expired/forged token, or not the owner
    Auth,
    /// Stale reference to an entity the service no longer has
    NotFound,
    /// Network, decoding or server failure
    Transport,
}

/// Feed API client error
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input rejected by the service (400/409/422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credentials or token rejected (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed, e.g. editing someone else's post (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Entity not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// HTTP request failed before a status was received
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Map this error onto the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Unauthorized(_) | ApiError::Forbidden(_) => ErrorKind::Auth,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Server { .. } | ApiError::Http(_) | ApiError::Json(_) => {
                ErrorKind::Transport
            }
        }
    }

    /// True when the service no longer accepts the presented token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Build the error for a non-success status and the service's message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 | 409 | 422 => ApiError::Validation(message),
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            _ => ApiError::Server { status, message },
        }
    }
}

/// Result type for feed API operations
pub type Result<T> = std::result::Result<T, ApiError>;
