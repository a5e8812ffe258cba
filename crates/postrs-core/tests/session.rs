//! Session lifecycle tests against an in-memory store and a stub provider.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use postrs_core::store::{ACCESS_TOKEN_KEY, EXPIRATION_DATE_KEY, REFRESH_TOKEN_KEY};
use postrs_core::{
    AuthorizationResult, InitOptions, MemoryStore, SessionError, SessionManager, SessionStatus,
    SessionStore, StorageError,
};
use postrs_oauth::Token;
use proptest::prelude::*;

use common::{StubProvider, invalid_grant};

type Manager = SessionManager<Arc<MemoryStore>, Arc<StubProvider>>;

fn manager(store: &Arc<MemoryStore>, provider: &Arc<StubProvider>) -> Manager {
    SessionManager::new(Arc::clone(store), Arc::clone(provider))
}

fn persisted(access: &str, refresh: Option<&str>, expires_at: DateTime<Utc>) -> Arc<MemoryStore> {
    let mut entries = vec![
        (ACCESS_TOKEN_KEY, access.to_string()),
        (EXPIRATION_DATE_KEY, expires_at.to_rfc3339()),
    ];
    if let Some(refresh) = refresh {
        entries.push((REFRESH_TOKEN_KEY, refresh.to_string()));
    }
    Arc::new(MemoryStore::with_entries(entries))
}

fn hour_ago() -> DateTime<Utc> {
    Utc::now() - ChronoDuration::hours(1)
}

fn hour_ahead() -> DateTime<Utc> {
    Utc::now() + ChronoDuration::hours(1)
}

fn get(store: &MemoryStore, key: &str) -> Option<String> {
    store.get(key).unwrap()
}

proptest! {
    #[test]
    fn login_then_current_token_returns_new_token(
        access in "[A-Za-z0-9._-]{1,64}",
        refresh in proptest::option::of("[A-Za-z0-9._-]{1,64}"),
        valid_for_secs in 1i64..86_400,
    ) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(StubProvider::new());
        let session = manager(&store, &provider);

        let mut result = AuthorizationResult::new(access.clone())
            .with_expires_at(Utc::now() + ChronoDuration::seconds(valid_for_secs));
        result.refresh_token = refresh.clone();

        session.login_with(result.clone()).unwrap();
        prop_assert_eq!(session.current_token(), Some(access.clone()));
        prop_assert_eq!(session.status(), SessionStatus::Authenticated);

        // Same result twice: same end state.
        session.login_with(result).unwrap();
        prop_assert_eq!(session.current_token(), Some(access.clone()));
        prop_assert_eq!(get(&store, ACCESS_TOKEN_KEY), Some(access));
        prop_assert_eq!(get(&store, REFRESH_TOKEN_KEY), refresh);
        prop_assert_eq!(provider.calls(), 0);
    }
}

#[tokio::test]
async fn initialize_without_persisted_session() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(StubProvider::new());
    let session = manager(&store, &provider);

    let status = session.initialize(InitOptions::default()).await;

    assert_eq!(status, SessionStatus::Unauthenticated);
    assert_eq!(session.current_token(), None);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn initialize_restores_valid_session_without_network() {
    let store = persisted("A1", Some("R1"), hour_ahead());
    let provider = Arc::new(StubProvider::new());
    let session = manager(&store, &provider);

    let status = session.initialize(InitOptions::eager()).await;

    assert_eq!(status, SessionStatus::Authenticated);
    assert_eq!(session.current_token().as_deref(), Some("A1"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn initialize_refreshes_expired_session() {
    let store = persisted("A1", Some("R1"), hour_ago());
    let provider = Arc::new(
        StubProvider::new().then_ok(
            Token::new("A2", "Bearer")
                .with_refresh_token("R2")
                .with_expires_at(hour_ahead()),
        ),
    );
    let session = manager(&store, &provider);

    let status = session.initialize(InitOptions::default()).await;

    assert_eq!(status, SessionStatus::Authenticated);
    let token = session.current_token().unwrap();
    assert_ne!(token, "A1");
    assert_eq!(token, "A2");
    assert_eq!(provider.seen(), vec!["R1".to_string()]);
    assert_eq!(get(&store, ACCESS_TOKEN_KEY).as_deref(), Some("A2"));
    assert_eq!(get(&store, REFRESH_TOKEN_KEY).as_deref(), Some("R2"));
}

#[tokio::test]
async fn refresh_without_rotation_keeps_refresh_token() {
    let store = persisted("A1", Some("R1"), hour_ago());
    let new_expiry = hour_ahead();
    let provider =
        Arc::new(StubProvider::new().then_ok(Token::new("A2", "Bearer").with_expires_at(new_expiry)));
    let session = manager(&store, &provider);

    session.initialize(InitOptions::default()).await;

    assert_eq!(session.current_token().as_deref(), Some("A2"));
    assert_eq!(get(&store, REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
    assert_eq!(
        get(&store, EXPIRATION_DATE_KEY),
        Some(new_expiry.to_rfc3339())
    );
    assert_eq!(
        session.session().unwrap().refresh_token.as_deref(),
        Some("R1")
    );
}

#[tokio::test]
async fn initialize_with_rejected_refresh_clears_everything() {
    let store = persisted("A1", Some("R1"), hour_ago());
    let provider = Arc::new(StubProvider::new().then_err(invalid_grant()));
    let session = manager(&store, &provider);

    let status = session.initialize(InitOptions::default()).await;

    assert_eq!(status, SessionStatus::Unauthenticated);
    assert_eq!(session.current_token(), None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn initialize_expired_without_refresh_token() {
    let store = persisted("A1", None, hour_ago());
    let provider = Arc::new(StubProvider::new());
    let session = manager(&store, &provider);

    let status = session.initialize(InitOptions::default()).await;

    assert_eq!(status, SessionStatus::Unauthenticated);
    assert_eq!(provider.calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn eager_validation_refreshes_session_without_expiry() {
    let store = Arc::new(MemoryStore::with_entries([
        (ACCESS_TOKEN_KEY, "A1"),
        (REFRESH_TOKEN_KEY, "R1"),
    ]));
    let provider =
        Arc::new(StubProvider::new().then_ok(Token::new("A2", "Bearer").with_expires_at(hour_ahead())));

    let lazy = manager(&store, &provider);
    lazy.initialize(InitOptions::default()).await;
    assert_eq!(lazy.current_token().as_deref(), Some("A1"));
    assert_eq!(provider.calls(), 0);

    let eager = manager(&store, &provider);
    eager.initialize(InitOptions::eager()).await;
    assert_eq!(eager.current_token().as_deref(), Some("A2"));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn unparsable_expiry_is_treated_as_unknown() {
    let store = Arc::new(MemoryStore::with_entries([
        (ACCESS_TOKEN_KEY, "A1"),
        (EXPIRATION_DATE_KEY, "next tuesday"),
    ]));
    let provider = Arc::new(StubProvider::new());
    let session = manager(&store, &provider);

    let status = session.initialize(InitOptions::default()).await;

    assert_eq!(status, SessionStatus::Authenticated);
    assert_eq!(session.current_token().as_deref(), Some("A1"));
}

#[tokio::test]
async fn logout_then_restart_is_unauthenticated() {
    let store = persisted("A1", Some("R1"), hour_ahead());
    let provider = Arc::new(StubProvider::new());

    let session = manager(&store, &provider);
    session.initialize(InitOptions::default()).await;
    session.logout().unwrap();

    assert_eq!(session.status(), SessionStatus::Unauthenticated);
    assert_eq!(session.current_token(), None);
    assert!(store.is_empty());

    let restarted = manager(&store, &provider);
    assert_eq!(
        restarted.initialize(InitOptions::eager()).await,
        SessionStatus::Unauthenticated
    );
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn concurrent_refreshes_share_one_exchange() {
    let provider = Arc::new(
        StubProvider::new()
            .with_delay(Duration::from_millis(50))
            .then_ok(Token::new("A2", "Bearer").with_expires_at(hour_ahead()))
            .then_ok(Token::new("A3", "Bearer").with_expires_at(hour_ahead())),
    );
    let store = Arc::new(MemoryStore::new());
    let session = manager(&store, &provider);
    session
        .login_with(
            AuthorizationResult::new("A1")
                .with_refresh_token("R1")
                .with_expires_at(hour_ago()),
        )
        .unwrap();

    let other = session.clone();
    let (a, b) = tokio::join!(session.refresh(), other.refresh());

    assert_eq!(a.unwrap().access_token, "A2");
    assert_eq!(b.unwrap().access_token, "A2");
    assert_eq!(provider.calls(), 1);
    assert_eq!(session.current_token().as_deref(), Some("A2"));
}

#[tokio::test(start_paused = true)]
async fn dropped_caller_does_not_cancel_refresh() {
    let provider = Arc::new(
        StubProvider::new()
            .with_delay(Duration::from_millis(50))
            .then_ok(Token::new("A2", "Bearer").with_expires_at(hour_ahead())),
    );
    let store = Arc::new(MemoryStore::new());
    let session = manager(&store, &provider);
    session
        .login_with(
            AuthorizationResult::new("A1")
                .with_refresh_token("R1")
                .with_expires_at(hour_ago()),
        )
        .unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(10), session.refresh()).await;
    assert!(abandoned.is_err());
    assert_eq!(session.status(), SessionStatus::Refreshing);

    // A later caller joins the same exchange.
    let joined = session.refresh().await.unwrap();
    assert_eq!(joined.access_token, "A2");
    assert_eq!(provider.calls(), 1);
    assert_eq!(session.status(), SessionStatus::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn logout_during_refresh_wins() {
    let provider = Arc::new(
        StubProvider::new()
            .with_delay(Duration::from_millis(50))
            .then_ok(Token::new("A2", "Bearer").with_expires_at(hour_ahead())),
    );
    let store = Arc::new(MemoryStore::new());
    let session = manager(&store, &provider);
    session
        .login_with(
            AuthorizationResult::new("A1")
                .with_refresh_token("R1")
                .with_expires_at(hour_ago()),
        )
        .unwrap();

    let refreshing = tokio::spawn({
        let session = session.clone();
        async move { session.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.logout().unwrap();

    let outcome = refreshing.await.unwrap();
    assert!(matches!(outcome, Err(SessionError::Superseded)));
    assert_eq!(session.status(), SessionStatus::Unauthenticated);
    assert_eq!(session.current_token(), None);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn login_during_refresh_keeps_new_session() {
    let provider = Arc::new(
        StubProvider::new()
            .with_delay(Duration::from_millis(50))
            .then_ok(Token::new("A2", "Bearer").with_expires_at(hour_ahead())),
    );
    let store = Arc::new(MemoryStore::new());
    let session = manager(&store, &provider);
    session
        .login_with(
            AuthorizationResult::new("A1")
                .with_refresh_token("R1")
                .with_expires_at(hour_ago()),
        )
        .unwrap();

    let refreshing = tokio::spawn({
        let session = session.clone();
        async move { session.valid_token().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    session
        .login_with(AuthorizationResult::new("B1").with_refresh_token("S1"))
        .unwrap();

    // The superseded caller falls back to the new session.
    assert_eq!(refreshing.await.unwrap().unwrap(), "B1");
    assert_eq!(session.current_token().as_deref(), Some("B1"));
    assert_eq!(get(&store, ACCESS_TOKEN_KEY).as_deref(), Some("B1"));
    assert_eq!(get(&store, REFRESH_TOKEN_KEY).as_deref(), Some("S1"));
}

#[tokio::test]
async fn refresh_requires_refresh_token() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(StubProvider::new());
    let session = manager(&store, &provider);

    assert!(matches!(
        session.refresh().await,
        Err(SessionError::NoRefreshToken)
    ));

    session.login_with(AuthorizationResult::new("A1")).unwrap();
    assert!(matches!(
        session.refresh().await,
        Err(SessionError::NoRefreshToken)
    ));
    assert_eq!(session.status(), SessionStatus::Authenticated);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn failed_refresh_reports_cause() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(StubProvider::new().then_err(invalid_grant()));
    let session = manager(&store, &provider);
    session
        .login_with(AuthorizationResult::new("A1").with_refresh_token("R1"))
        .unwrap();

    match session.refresh().await {
        Err(SessionError::RefreshFailed { cause }) => assert!(cause.is_invalid_grant()),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.status(), SessionStatus::Unauthenticated);
    assert!(store.is_empty());
}

#[tokio::test]
async fn valid_token_refreshes_only_when_expired() {
    let store = Arc::new(MemoryStore::new());
    let provider =
        Arc::new(StubProvider::new().then_ok(Token::new("A2", "Bearer").with_expires_at(hour_ahead())));
    let session = manager(&store, &provider);

    assert!(matches!(
        session.valid_token().await,
        Err(SessionError::NotAuthenticated)
    ));

    session
        .login_with(
            AuthorizationResult::new("A1")
                .with_refresh_token("R1")
                .with_expires_at(hour_ahead()),
        )
        .unwrap();
    assert_eq!(session.valid_token().await.unwrap(), "A1");
    assert_eq!(provider.calls(), 0);

    session
        .login_with(
            AuthorizationResult::new("A1")
                .with_refresh_token("R1")
                .with_expires_at(hour_ago()),
        )
        .unwrap();
    assert_eq!(session.current_token(), None);
    assert_eq!(session.valid_token().await.unwrap(), "A2");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn login_without_optional_fields_clears_stale_keys() {
    let store = persisted("A0", Some("R0"), hour_ahead());
    let provider = Arc::new(StubProvider::new());
    let session = manager(&store, &provider);
    session.initialize(InitOptions::default()).await;

    session.login_with(AuthorizationResult::new("A1")).unwrap();

    assert_eq!(get(&store, ACCESS_TOKEN_KEY).as_deref(), Some("A1"));
    assert_eq!(get(&store, REFRESH_TOKEN_KEY), None);
    assert_eq!(get(&store, EXPIRATION_DATE_KEY), None);
}

#[test]
fn token_expiring_now_is_not_current() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(StubProvider::new());
    let session = manager(&store, &provider);
    let expires_at = Utc::now() + ChronoDuration::minutes(5);
    session
        .login_with(AuthorizationResult::new("A1").with_expires_at(expires_at))
        .unwrap();

    assert_eq!(
        session.current_token_at(expires_at - ChronoDuration::seconds(1)).as_deref(),
        Some("A1")
    );
    assert_eq!(session.current_token_at(expires_at), None);
}

/// A store whose backend is gone.
struct BrokenStore;

impl SessionStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("locked".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("locked".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("locked".into()))
    }
}

#[tokio::test]
async fn storage_failures_degrade_but_surface_on_write() {
    let provider = Arc::new(StubProvider::new());
    let session = SessionManager::new(BrokenStore, Arc::clone(&provider));

    assert_eq!(
        session.initialize(InitOptions::default()).await,
        SessionStatus::Unauthenticated
    );

    let result = session.login_with(AuthorizationResult::new("A1"));
    assert!(matches!(result, Err(SessionError::Storage(_))));
    assert_eq!(session.current_token().as_deref(), Some("A1"));

    // Logout still clears memory even though storage refuses.
    assert!(session.logout().is_err());
    assert_eq!(session.status(), SessionStatus::Unauthenticated);
}

/// A memory store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    entries: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    fn write(&self, op: impl FnOnce(&MemoryStore) -> Result<(), StorageError>) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk full".into()));
        }
        op(&self.entries)
    }
}

impl SessionStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.entries.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(|entries| entries.set(key, value))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.write(|entries| entries.remove(key))
    }
}

#[tokio::test]
async fn refresh_that_cannot_be_saved_is_reported() {
    let store = Arc::new(FlakyStore::default());
    let provider = Arc::new(
        StubProvider::new().then_ok(
            Token::new("A2", "Bearer")
                .with_refresh_token("R2")
                .with_expires_at(hour_ahead()),
        ),
    );
    let session = SessionManager::new(Arc::clone(&store), Arc::clone(&provider));
    session
        .login_with(
            AuthorizationResult::new("A1")
                .with_refresh_token("R1")
                .with_expires_at(hour_ago()),
        )
        .unwrap();
    store.fail_writes.store(true, Ordering::SeqCst);

    match session.refresh().await {
        Err(SessionError::RefreshNotSaved { session, cause }) => {
            assert_eq!(session.access_token, "A2");
            assert_eq!(session.refresh_token.as_deref(), Some("R2"));
            assert!(matches!(*cause, StorageError::Unavailable(_)));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // The new session is in use; only the persisted copy is stale.
    assert_eq!(session.status(), SessionStatus::Authenticated);
    assert_eq!(session.current_token().as_deref(), Some("A2"));
    assert_eq!(
        store.entries.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("R1")
    );
    assert_eq!(session.valid_token().await.unwrap(), "A2");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn crashed_refresh_without_waiters_leaves_refreshing() {
    let provider = Arc::new(
        StubProvider::new()
            .with_delay(Duration::from_millis(50))
            .panicking(),
    );
    let store = Arc::new(MemoryStore::new());
    let session = manager(&store, &provider);
    session
        .login_with(
            AuthorizationResult::new("A1")
                .with_refresh_token("R1")
                .with_expires_at(hour_ago()),
        )
        .unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(10), session.refresh()).await;
    assert!(abandoned.is_err());
    assert_eq!(session.status(), SessionStatus::Refreshing);

    // Nobody polls the refresh while the provider crashes.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.status(), SessionStatus::Authenticated);
    assert_eq!(
        session.session().unwrap().refresh_token.as_deref(),
        Some("R1")
    );

    // A later refresh starts a fresh exchange instead of joining the dead one.
    assert!(matches!(
        session.refresh().await,
        Err(SessionError::RefreshInterrupted)
    ));
    assert_eq!(provider.calls(), 2);
    assert_eq!(session.status(), SessionStatus::Authenticated);
}
