//! Identity provider access for the session manager.

use std::future::Future;
use std::sync::Arc;

use postrs_oauth::{AuthorizationCodeFlow, OAuthClient, Provider, Token};
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::AuthConfig;

/// The refresh-token exchange the session manager depends on.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Exchanges `refresh_token` for a new access token.
    ///
    /// A returned token without `refresh_token` means the provider did not
    /// rotate it.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = postrs_oauth::Result<Token>> + Send;
}

impl<T: IdentityProvider> IdentityProvider for Arc<T> {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = postrs_oauth::Result<Token>> + Send {
        (**self).refresh(refresh_token)
    }
}

/// OIDC identity provider configured from an issuer URL.
///
/// The discovery document is fetched on first use only, so constructing
/// one never touches the network.
#[derive(Debug)]
pub struct OidcIdentity {
    config: AuthConfig,
    http: reqwest::Client,
    client: OnceCell<OAuthClient>,
}

impl OidcIdentity {
    /// Creates an identity provider for `config`.
    #[must_use]
    pub fn new(config: AuthConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            client: OnceCell::new(),
        }
    }

    /// The redirect URI registered for this client.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.config.redirect_uri
    }

    /// Returns the OAuth client, discovering the provider on first call.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails.
    pub async fn client(&self) -> postrs_oauth::Result<&OAuthClient> {
        self.client
            .get_or_try_init(|| async {
                let provider = Provider::discover(&self.http, &self.config.issuer)
                    .await?
                    .with_default_scopes(self.config.scopes.clone());
                info!("Discovered identity provider {}", provider.issuer);
                Ok::<_, postrs_oauth::Error>(
                    OAuthClient::new(&self.config.client_id, provider)
                        .with_redirect_uri(&self.config.redirect_uri)
                        .with_http_client(self.http.clone()),
                )
            })
            .await
    }

    /// Starts an authorization code flow with PKCE.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails.
    pub async fn authorization_flow(&self) -> postrs_oauth::Result<AuthorizationCodeFlow> {
        let client = self.client().await?.clone();
        Ok(AuthorizationCodeFlow::new(client).with_pkce())
    }
}

impl IdentityProvider for OidcIdentity {
    async fn refresh(&self, refresh_token: &str) -> postrs_oauth::Result<Token> {
        self.client().await?.refresh(refresh_token).await
    }
}
