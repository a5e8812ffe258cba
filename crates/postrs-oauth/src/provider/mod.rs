//! `OAuth2` provider configurations.

use crate::error::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Path of the OIDC discovery document, relative to the issuer.
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Issuer identifier (e.g., `https://login.microsoftonline.com/<tenant>/v2.0`).
    pub issuer: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Default scopes.
    pub default_scopes: Vec<String>,
}

/// The subset of an OIDC discovery document this crate needs.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: Option<String>,
    authorization_endpoint: String,
    token_endpoint: String,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        issuer: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            issuer: issuer.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Returns the discovery document URL for an issuer.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is not a valid URL.
    pub fn discovery_url(issuer: &str) -> Result<Url> {
        let base = if issuer.ends_with('/') {
            Url::parse(issuer)?
        } else {
            Url::parse(&format!("{issuer}/"))?
        };
        Ok(base.join(DISCOVERY_PATH)?)
    }

    /// Resolves a provider from the issuer's OIDC discovery document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be fetched or lacks endpoints.
    pub async fn discover(http: &Client, issuer: &str) -> Result<Self> {
        let url = Self::discovery_url(issuer)?;
        debug!("Fetching OIDC discovery document from {url}");

        let response = http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        Self::from_discovery_json(issuer, &body)
    }

    /// Builds a provider from a discovery document body.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or its endpoints are invalid.
    pub fn from_discovery_json(issuer: &str, json: &str) -> Result<Self> {
        let doc: DiscoveryDocument = serde_json::from_str(json)?;
        let provider = Self::new(
            doc.issuer.unwrap_or_else(|| issuer.to_string()),
            &doc.authorization_endpoint,
            &doc.token_endpoint,
        )?;
        provider.validate()?;
        Ok(provider)
    }

    /// Validates that required URLs are usable.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("auth_url", &self.auth_url), ("token_url", &self.token_url)] {
            if !matches!(url.scheme(), "https" | "http") {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be an http(s) URL, got {url}"
                )));
            }
        }
        Ok(())
    }
}
