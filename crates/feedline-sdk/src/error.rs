//! Error types for the session and reconciliation layer

use feedline_client::{ApiError, ErrorKind};
use thiserror::Error;

use crate::config::ConfigError;
use crate::credential::CredentialError;

/// Error returned at the boundary of the session manager and controllers
#[derive(Debug, Error)]
pub enum SdkError {
    /// Input rejected locally before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation needs a signed-in user
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A logout or newer login happened while this one was in flight
    #[error("Session changed while signing in")]
    SessionChanged,

    /// The same action is already in flight
    #[error("Action already in progress: {0}")]
    Busy(String),

    /// Error reported by the feed service or the transport
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Credential persistence failed
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::Validation(_) | SdkError::Busy(_) => ErrorKind::Validation,
            SdkError::NotAuthenticated | SdkError::SessionChanged => ErrorKind::Auth,
            SdkError::Api(err) => err.kind(),
            SdkError::Credential(_) | SdkError::Config(_) => ErrorKind::Transport,
        }
    }

    /// True when the service rejected the session's token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SdkError::Api(err) if err.is_unauthorized())
    }
}

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;
