//! `OAuth2` authorization flows.

mod code;
mod pkce;
mod redirect;

pub use code::AuthorizationCodeFlow;
pub use pkce::PkceChallenge;
pub use redirect::RedirectListener;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};
use chrono::Utc;
use reqwest::{Client, Response};
use std::collections::HashMap;
use tracing::debug;

/// Common `OAuth2` client configuration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret (optional for public clients).
    pub client_secret: Option<String>,
    /// Redirect URI for authorization code flow.
    pub redirect_uri: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Uses an existing HTTP client (shares its connection pool).
    #[must_use]
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// The returned token's `refresh_token` is `None` when the provider did
    /// not rotate it; callers decide whether to keep the old one.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects the grant.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.client_id);

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        let scope = self.provider.default_scopes.join(" ");
        if !scope.is_empty() {
            params.insert("scope", &scope);
        }

        debug!("Refreshing access token at {}", self.provider.token_url);
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        read_token_response(response).await
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub(crate) async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Token> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", &self.client_id);

        if let Some(uri) = self.redirect_uri.as_deref() {
            params.insert("redirect_uri", uri);
        }

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        if let Some(verifier) = code_verifier {
            params.insert("code_verifier", verifier);
        }

        debug!("Exchanging authorization code at {}", self.provider.token_url);
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        read_token_response(response).await
    }
}

/// Turns a token endpoint response into a token or the server's error.
async fn read_token_response(response: Response) -> Result<Token> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(serde_json::from_str::<ErrorResponse>(&body).map_or_else(
            |_| Error::Endpoint {
                status: status.as_u16(),
                body,
            },
            ErrorResponse::into_error,
        ));
    }

    let token_response: TokenResponse = serde_json::from_str(&body)?;
    Token::from_response(token_response, Utc::now())
}
