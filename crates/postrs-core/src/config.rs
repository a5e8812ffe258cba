//! Application configuration.
//!
//! Read from `<config dir>/postrs/config.json`. Every field is optional in
//! the file; missing fields (or a missing file) take the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Directory name under the platform config directory.
const APP_DIR: &str = "postrs";

/// Config file name.
const CONFIG_FILE: &str = "config.json";

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("Cannot read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid JSON for [`AppConfig`].
    #[error("Invalid config file {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A value is present but unusable.
    #[error("Invalid setting {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Identity provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OIDC issuer; endpoints come from its discovery document.
    pub issuer: String,
    /// Registered client identifier.
    pub client_id: String,
    /// Registered redirect URI (a loopback `http` URI for this client).
    pub redirect_uri: String,
    /// Requested scopes; `offline_access` is needed for a refresh token.
    pub scopes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "https://login.microsoftonline.com/cec049b2-7cc6-4549-84ef-53539e7694f5/v2.0"
                .to_string(),
            client_id: "8b21c9ab-05d8-400a-9311-3f0481fce248".to_string(),
            redirect_uri: "http://localhost:8765/auth/".to_string(),
            scopes: [
                "openid",
                "profile",
                "email",
                "offline_access",
                "https://outlook.office.com/IMAP.AccessAsUser.All",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the email API.
    pub api_base_url: String,
    /// Identity provider settings.
    pub auth: AuthConfig,
    /// Seconds to wait for the browser redirect during sign-in.
    pub login_timeout_secs: u64,
    /// Seconds allowed for establishing an HTTP connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for a whole HTTP request, response body included.
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://postrs.gistia.online:3001".to_string(),
            auth: AuthConfig::default(),
            login_timeout_secs: 180,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE)
    }

    /// Loads configuration from `path`, or from [`Self::default_path`].
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// a value fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);

        let config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                debug!("Loading config from {}", path.display());
                serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses the API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed.
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.api_base_url).map_err(|e| ConfigError::Invalid {
            field: "api_base_url",
            reason: e.to_string(),
        })
    }

    /// Builds the HTTP client shared by the identity provider and the email
    /// API, bounded by the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
    }

    /// Checks values that would otherwise fail late.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_base_url()?;
        Url::parse(&self.auth.issuer).map_err(|e| ConfigError::Invalid {
            field: "auth.issuer",
            reason: e.to_string(),
        })?;
        if self.auth.client_id.is_empty() {
            return Err(ConfigError::Invalid {
                field: "auth.client_id",
                reason: "must not be empty".into(),
            });
        }
        for (field, secs) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1 second".into(),
                });
            }
        }
        if !self.auth.scopes.iter().any(|s| s == "offline_access") {
            tracing::warn!("Scopes lack offline_access; sessions will not be refreshable");
        }
        Ok(())
    }
}
