//! Authentication session lifecycle.
//!
//! A [`SessionManager`] is the single source of truth for whether the user
//! is signed in and with which access token. States:
//!
//! ```text
//! Unauthenticated --login_with--> Authenticated
//! Authenticated --refresh--> Refreshing --ok--> Authenticated
//!                                       --err--> Unauthenticated
//! Authenticated | Refreshing --logout--> Unauthenticated
//! ```

mod manager;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use postrs_oauth::Token;

use crate::store::StorageError;

pub use manager::SessionManager;

/// The current credentials of a signed-in user.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Credential for obtaining a new access token without user interaction.
    pub refresh_token: Option<String>,
    /// Instant from which `access_token` must not be used without refreshing.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Returns true if the access token must be refreshed before use at `now`.
    ///
    /// A token expiring exactly at `now` counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Returns true if the access token is expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Outcome of an interactive authorization, handed to
/// [`SessionManager::login_with`].
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    /// Access token.
    pub access_token: String,
    /// Refresh token, when offline access was granted.
    pub refresh_token: Option<String>,
    /// Access token expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthorizationResult {
    /// Creates a result carrying only an access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl fmt::Debug for AuthorizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationResult")
            .field("refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl From<Token> for AuthorizationResult {
    fn from(token: Token) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_at,
        }
    }
}

impl From<AuthorizationResult> for Session {
    fn from(result: AuthorizationResult) -> Self {
        Self {
            access_token: result.access_token,
            refresh_token: result.refresh_token,
            expires_at: result.expires_at,
        }
    }
}

/// Externally visible state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No usable session; the user must sign in.
    Unauthenticated,
    /// A session is present.
    Authenticated,
    /// A refresh exchange is in flight.
    Refreshing,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unauthenticated => "signed out",
            Self::Authenticated => "signed in",
            Self::Refreshing => "refreshing",
        })
    }
}

/// Options for [`SessionManager::initialize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Refresh on startup when the persisted session has a refresh token but
    /// no known expiry.
    pub eager_validation: bool,
}

impl InitOptions {
    /// Options with eager validation enabled.
    #[must_use]
    pub const fn eager() -> Self {
        Self {
            eager_validation: true,
        }
    }
}

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is present.
    #[error("Not signed in")]
    NotAuthenticated,

    /// The session has no refresh token.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The identity provider rejected or failed the refresh exchange.
    #[error("Token refresh failed: {cause}")]
    RefreshFailed {
        /// Underlying provider error.
        cause: Arc<postrs_oauth::Error>,
    },

    /// The refresh task ended without producing a result.
    #[error("Token refresh was interrupted")]
    RefreshInterrupted,

    /// A login or logout replaced the session while the refresh was in flight.
    #[error("Session changed while refreshing")]
    Superseded,

    /// The refresh succeeded and the new session is in use, but storing it
    /// failed; the persisted copy is stale until the next successful write.
    #[error("Session refreshed but not saved: {cause}")]
    RefreshNotSaved {
        /// The refreshed session, already current in memory.
        session: Session,
        /// Underlying storage error.
        cause: Arc<StorageError>,
    },

    /// Persisting the session failed.
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}
