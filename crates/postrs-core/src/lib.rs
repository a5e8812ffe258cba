//! # postrs-core
//!
//! Core logic for the postrs mail client.
//!
//! This crate provides:
//! - **Session lifecycle** - sign-in, persistence, refresh on expiry, sign-out
//! - **Session storage** - system keyring or in-memory key-value stores
//! - **Identity provider access** - lazy OIDC discovery and token refresh
//! - **Email API client** - list, read and move messages with a bearer token
//! - **Screen state** - message list and message view
//! - **Configuration** - JSON config file with built-in defaults

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
mod error;
pub mod identity;
pub mod inbox;
pub mod login;
pub mod session;
pub mod store;

pub use api::{ApiError, EmailApi, EmailDetail, EmailSummary, Folder};
pub use config::{AppConfig, AuthConfig, ConfigError};
pub use error::{Error, Result};
pub use identity::{IdentityProvider, OidcIdentity};
pub use inbox::{Inbox, MessageView, ScreenError};
pub use login::interactive_login;
pub use postrs_oauth::Error as AuthError;
pub use session::{
    AuthorizationResult, InitOptions, Session, SessionError, SessionManager, SessionStatus,
};
pub use store::{KeyringStore, MemoryStore, SessionStore, StorageError};
