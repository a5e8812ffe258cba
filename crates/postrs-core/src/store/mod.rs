//! Persistent key-value storage for the session.
//!
//! The session manager is the only writer of the three session keys; it
//! mirrors every change of the in-memory session into a [`SessionStore`].

mod keyring;
mod memory;

use std::sync::Arc;

pub use self::keyring::KeyringStore;
pub use self::memory::MemoryStore;

/// Key holding the current access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Key holding the access token expiry as an RFC 3339 timestamp.
pub const EXPIRATION_DATE_KEY: &str = "expirationDate";

/// All keys owned by the session manager.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRATION_DATE_KEY];

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] ::keyring::Error),

    /// Storage backend cannot be used at all.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A string key-value store that survives process restarts.
pub trait SessionStore: Send + Sync {
    /// Reads a value; a missing key is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes a value; removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}
