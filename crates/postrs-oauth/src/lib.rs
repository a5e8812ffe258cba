//! # postrs-oauth
//!
//! `OAuth2`/OIDC sign-in for the postrs mail client.
//!
//! ## Features
//!
//! - **Provider discovery**: endpoints from an OIDC issuer's discovery document
//! - **Authorization Code Flow**: with PKCE (S256) and CSRF `state`
//! - **Loopback redirect capture**: a one-shot HTTP listener for the redirect
//! - **Token refresh**: refresh-token exchange against the token endpoint
//!
//! ## Quick Start
//!
//! ```ignore
//! use postrs_oauth::{AuthorizationCodeFlow, OAuthClient, Provider, RedirectListener};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Provider::discover(
//!         &reqwest::Client::new(),
//!         "https://login.microsoftonline.com/common/v2.0",
//!     )
//!     .await?;
//!     let client = OAuthClient::new("your_client_id", provider)
//!         .with_redirect_uri("http://localhost:8765/auth/");
//!
//!     let listener = RedirectListener::bind("http://localhost:8765/auth/").await?;
//!     let flow = AuthorizationCodeFlow::new(client).with_pkce();
//!     let url = flow.authorization_url(None)?;
//!     println!("Visit: {url}");
//!
//!     let code = listener.wait_for_code(flow.state(), 120).await?;
//!     let token = flow.exchange_code(&code).await?;
//!     println!("Expires at: {:?}", token.expires_at);
//!     Ok(())
//! }
//! ```
//!
//! ### Token Refresh
//!
//! ```ignore
//! let refreshed = client.refresh(refresh_token).await?;
//! // `refreshed.refresh_token` is `None` when the provider does not rotate.
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthorizationCodeFlow, OAuthClient, PkceChallenge, RedirectListener};
pub use provider::Provider;
pub use token::Token;
