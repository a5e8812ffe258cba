//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Interactive authorization failed or was cancelled.
    #[error("Authorization error: {0}")]
    Auth(#[from] postrs_oauth::Error),

    /// Session operation failed.
    #[error("Session error: {0}")]
    Session(#[from] crate::session::SessionError),

    /// Email API call failed.
    #[error("API error: {0}")]
    Api(#[from] crate::api::ApiError),

    /// Session storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] crate::store::StorageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<crate::inbox::ScreenError> for Error {
    fn from(error: crate::inbox::ScreenError) -> Self {
        match error {
            crate::inbox::ScreenError::Session(e) => Self::Session(e),
            crate::inbox::ScreenError::Api(e) => Self::Api(e),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
