//! The session manager.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use postrs_oauth::Token;
use tracing::{debug, info, warn};

use super::{AuthorizationResult, InitOptions, Session, SessionError, SessionStatus};
use crate::identity::IdentityProvider;
use crate::store::{
    ACCESS_TOKEN_KEY, EXPIRATION_DATE_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, SessionStore,
    StorageError, StorageResult,
};

/// Why a shared refresh did not produce a session.
#[derive(Debug, Clone)]
enum RefreshFailure {
    Provider(Arc<postrs_oauth::Error>),
    NotSaved(Session, Arc<StorageError>),
    Interrupted,
    Superseded,
}

impl From<RefreshFailure> for SessionError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Provider(cause) => Self::RefreshFailed { cause },
            RefreshFailure::NotSaved(session, cause) => Self::RefreshNotSaved { session, cause },
            RefreshFailure::Interrupted => Self::RefreshInterrupted,
            RefreshFailure::Superseded => Self::Superseded,
        }
    }
}

type RefreshOutcome = Result<Session, RefreshFailure>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Unauthenticated,
    Authenticated(Session),
    Refreshing(Session),
}

#[derive(Default)]
struct State {
    phase: Phase,
    /// Bumped by every login and logout; a refresh started under an older
    /// epoch must not touch the session.
    epoch: u64,
    inflight: Option<SharedRefresh>,
}

struct Inner<S, P> {
    store: S,
    provider: P,
    state: Mutex<State>,
}

/// Owns the authentication session and mirrors it into a [`SessionStore`].
///
/// Cloning is cheap; clones share the same session. Store writes happen
/// while the state lock is held, so the persisted copy never disagrees with
/// a completed in-memory transition.
pub struct SessionManager<S, P> {
    inner: Arc<Inner<S, P>>,
}

impl<S, P> Clone for SessionManager<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, P> SessionManager<S, P>
where
    S: SessionStore + 'static,
    P: IdentityProvider,
{
    /// Creates an unauthenticated manager. Call [`Self::initialize`] before
    /// reading tokens.
    #[must_use]
    pub fn new(store: S, provider: P) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                provider,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// The identity provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// Loads the persisted session and refreshes it if it is expired.
    ///
    /// Never fails: unreadable storage and failed refreshes end in
    /// [`SessionStatus::Unauthenticated`].
    pub async fn initialize(&self, options: InitOptions) -> SessionStatus {
        let Some(session) = self.inner.load() else {
            info!("No persisted session");
            self.inner.lock_state().phase = Phase::Unauthenticated;
            return SessionStatus::Unauthenticated;
        };

        let needs_refresh = session.is_expired_at(Utc::now())
            || (options.eager_validation
                && session.expires_at.is_none()
                && session.refresh_token.is_some());
        let refreshable = session.refresh_token.is_some();

        self.inner.lock_state().phase = Phase::Authenticated(session);

        if needs_refresh {
            if refreshable {
                debug!("Persisted session needs refresh");
                match self.refresh().await {
                    Ok(_) => info!("Session refreshed on startup"),
                    Err(e @ SessionError::RefreshNotSaved { .. }) => warn!("{e}"),
                    Err(e) => warn!("Session refresh failed on startup: {e}"),
                }
            } else {
                warn!("Persisted access token expired and no refresh token is stored");
                self.inner.reset();
            }
        } else {
            info!("Restored persisted session");
        }

        self.status()
    }

    /// Installs the result of an interactive sign-in and persists it.
    ///
    /// Fields absent from `result` are removed from storage. An in-flight
    /// refresh is superseded and its result discarded.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if persisting fails; the in-memory
    /// session is set regardless and lasts until the process exits.
    pub fn login_with(&self, result: AuthorizationResult) -> Result<(), SessionError> {
        let session = Session::from(result);

        let mut state = self.inner.lock_state();
        state.epoch += 1;
        state.inflight = None;
        state.phase = Phase::Authenticated(session.clone());
        let persisted = self.inner.persist(&session);
        drop(state);

        info!("Signed in");
        persisted.map_err(SessionError::from)
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// Concurrent callers share one exchange. The exchange runs as its own
    /// task, so dropping a caller does not cancel it for the others.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoRefreshToken`] without a refresh token;
    /// [`SessionError::RefreshFailed`] when the provider fails, after which
    /// the session is cleared in memory and in storage;
    /// [`SessionError::RefreshNotSaved`] when the new session is in use but
    /// could not be stored.
    pub async fn refresh(&self) -> Result<Session, SessionError> {
        let refresh = {
            let mut state = self.inner.lock_state();
            match state.inflight.clone() {
                Some(inflight) => {
                    debug!("Joining in-flight token refresh");
                    inflight
                }
                None => {
                    let session = match &state.phase {
                        Phase::Authenticated(session) | Phase::Refreshing(session) => {
                            session.clone()
                        }
                        Phase::Unauthenticated => return Err(SessionError::NoRefreshToken),
                    };
                    let Some(refresh_token) = session.refresh_token.clone() else {
                        return Err(SessionError::NoRefreshToken);
                    };

                    let epoch = state.epoch;
                    state.phase = Phase::Refreshing(session);

                    let shared = self.spawn_refresh(epoch, refresh_token);
                    state.inflight = Some(shared.clone());
                    shared
                }
            }
        };

        refresh.await.map_err(SessionError::from)
    }

    fn spawn_refresh(&self, epoch: u64, refresh_token: String) -> SharedRefresh {
        let task = tokio::spawn(Arc::clone(&self.inner).run_refresh(epoch, refresh_token));

        async move {
            task.await.unwrap_or_else(|e| {
                warn!("Token refresh task ended abnormally: {e}");
                Err(RefreshFailure::Interrupted)
            })
        }
        .boxed()
        .shared()
    }

    /// Signs out: clears the in-memory session, then the persisted keys.
    ///
    /// Performs no network I/O. The in-memory session is always cleared.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if a persisted key could not be
    /// removed.
    pub fn logout(&self) -> Result<(), SessionError> {
        let mut state = self.inner.lock_state();
        state.epoch += 1;
        state.inflight = None;
        state.phase = Phase::Unauthenticated;
        let cleared = self.inner.clear_store();
        drop(state);

        info!("Signed out");
        cleared.map_err(SessionError::from)
    }

    /// The access token, if present and not expired. Never performs I/O.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.current_token_at(Utc::now())
    }

    /// [`Self::current_token`] evaluated at `now`.
    #[must_use]
    pub fn current_token_at(&self, now: DateTime<Utc>) -> Option<String> {
        match &self.inner.lock_state().phase {
            Phase::Authenticated(session) | Phase::Refreshing(session)
                if !session.is_expired_at(now) =>
            {
                Some(session.access_token.clone())
            }
            _ => None,
        }
    }

    /// A usable access token, refreshing first if the current one expired.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotAuthenticated`] without a session, otherwise the
    /// errors of [`Self::refresh`].
    pub async fn valid_token(&self) -> Result<String, SessionError> {
        if let Some(token) = self.current_token() {
            return Ok(token);
        }
        if self.status() == SessionStatus::Unauthenticated {
            return Err(SessionError::NotAuthenticated);
        }

        match self.refresh().await {
            Ok(session) => Ok(session.access_token),
            Err(SessionError::Superseded) => {
                self.current_token().ok_or(SessionError::NotAuthenticated)
            }
            Err(e) => Err(e),
        }
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match self.inner.lock_state().phase {
            Phase::Unauthenticated => SessionStatus::Unauthenticated,
            Phase::Authenticated(_) => SessionStatus::Authenticated,
            Phase::Refreshing(_) => SessionStatus::Refreshing,
        }
    }

    /// Snapshot of the current session, expired or not.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        match &self.inner.lock_state().phase {
            Phase::Authenticated(session) | Phase::Refreshing(session) => Some(session.clone()),
            Phase::Unauthenticated => None,
        }
    }
}

impl<S, P> Inner<S, P>
where
    S: SessionStore,
    P: IdentityProvider,
{
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_refresh(self: Arc<Self>, epoch: u64, refresh_token: String) -> RefreshOutcome {
        let mut guard = AbandonGuard {
            inner: Arc::clone(&self),
            epoch,
            armed: true,
        };
        let outcome = self.provider.refresh(&refresh_token).await;
        let applied = self.apply_refresh(epoch, refresh_token, outcome);
        guard.armed = false;
        applied
    }

    fn apply_refresh(
        &self,
        epoch: u64,
        refresh_token: String,
        outcome: postrs_oauth::Result<Token>,
    ) -> RefreshOutcome {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            debug!("Discarding refresh result for a replaced session");
            return Err(RefreshFailure::Superseded);
        }
        state.inflight = None;

        match outcome {
            Ok(token) => {
                let rotated = token.refresh_token.is_some();
                let session = Session {
                    access_token: token.access_token,
                    refresh_token: token.refresh_token.or(Some(refresh_token)),
                    expires_at: token.expires_at,
                };
                state.phase = Phase::Authenticated(session.clone());
                info!(rotated, "Access token refreshed");
                match self.persist(&session) {
                    Ok(()) => Ok(session),
                    Err(e) => {
                        warn!("Refreshed session could not be persisted: {e}");
                        Err(RefreshFailure::NotSaved(session, Arc::new(e)))
                    }
                }
            }
            Err(e) => {
                warn!("Token refresh failed, signing out: {e}");
                state.phase = Phase::Unauthenticated;
                if let Err(e) = self.clear_store() {
                    warn!("Could not clear stale session from storage: {e}");
                }
                Err(RefreshFailure::Provider(Arc::new(e)))
            }
        }
    }

    /// Returns to the pre-refresh session after a refresh task died.
    /// A no-op once a login or logout has replaced the session.
    fn abandon_refresh(&self, epoch: u64) {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            return;
        }
        state.inflight = None;
        if let Phase::Refreshing(session) = std::mem::take(&mut state.phase) {
            state.phase = Phase::Authenticated(session);
        }
    }

    /// Drops an unusable session from memory and storage.
    fn reset(&self) {
        let mut state = self.lock_state();
        state.epoch += 1;
        state.inflight = None;
        state.phase = Phase::Unauthenticated;
        if let Err(e) = self.clear_store() {
            warn!("Could not clear stale session from storage: {e}");
        }
    }

    /// Reads the persisted session; unreadable values count as absent.
    fn load(&self) -> Option<Session> {
        let access_token = self.read(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())?;
        let refresh_token = self.read(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty());
        let expires_at = self.read(EXPIRATION_DATE_KEY).and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .inspect_err(|e| warn!("Ignoring unparsable {EXPIRATION_DATE_KEY}: {e}"))
                .ok()
        });

        Some(Session {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    fn read(&self, key: &str) -> Option<String> {
        self.store
            .get(key)
            .inspect_err(|e| warn!("Failed to read {key}: {e}"))
            .ok()
            .flatten()
    }

    /// Writes all three keys; absent fields are removed.
    fn persist(&self, session: &Session) -> StorageResult<()> {
        let writes = [
            self.store.set(ACCESS_TOKEN_KEY, &session.access_token),
            match &session.refresh_token {
                Some(token) => self.store.set(REFRESH_TOKEN_KEY, token),
                None => self.store.remove(REFRESH_TOKEN_KEY),
            },
            match session.expires_at {
                Some(expires_at) => self
                    .store
                    .set(EXPIRATION_DATE_KEY, &expires_at.to_rfc3339()),
                None => self.store.remove(EXPIRATION_DATE_KEY),
            },
        ];
        writes.into_iter().collect()
    }

    /// Removes all three keys, attempting each even if one fails.
    fn clear_store(&self) -> StorageResult<()> {
        let mut result = Ok(());
        for key in SESSION_KEYS {
            if let Err(e) = self.store.remove(key) {
                warn!("Failed to remove {key}: {e}");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

/// Leaves `Refreshing` if the refresh task unwinds or is dropped before
/// applying its result, whether or not any caller is still waiting.
struct AbandonGuard<S, P>
where
    S: SessionStore,
    P: IdentityProvider,
{
    inner: Arc<Inner<S, P>>,
    epoch: u64,
    armed: bool,
}

impl<S, P> Drop for AbandonGuard<S, P>
where
    S: SessionStore,
    P: IdentityProvider,
{
    fn drop(&mut self) {
        if self.armed {
            self.inner.abandon_refresh(self.epoch);
        }
    }
}
