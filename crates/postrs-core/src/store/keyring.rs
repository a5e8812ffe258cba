//! Secure session storage using the system keyring.
//!
//! Uses the platform's native credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use tracing::{debug, warn};

use super::{SessionStore, StorageResult};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "postrs";

/// A [`SessionStore`] that keeps each key in its own keyring entry.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    /// Creates a store under the default service name.
    #[must_use]
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Creates a store under a custom service name (separate profiles, tests).
    #[must_use]
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> StorageResult<Entry> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl SessionStore for KeyringStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => {
                debug!("No {key} entry in keyring");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entry(key)?.set_password(value)?;
        debug!("Stored {key} in keyring");
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => {
                debug!("Deleted {key} from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No {key} entry to delete");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete {key} from keyring: {e}");
                Err(e.into())
            }
        }
    }
}
