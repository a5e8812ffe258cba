//! HTTP client for the email API.
//!
//! Every call takes the bearer token explicitly. Callers obtain it from the
//! session manager at call time; a 401 is surfaced, never retried here.

mod model;

pub use model::{EmailDetail, EmailSummary, Folder};

use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;
use url::Url;

/// Errors from the email API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("HTTP error: {status} - {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request could not be sent or the response not read.
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body is not what the endpoint promises.
    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The base URL cannot carry path segments.
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// Returns true if the server rejected the bearer token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }
}

/// Client for `/api/emails`.
#[derive(Debug, Clone)]
pub struct EmailApi {
    http: Client,
    base_url: Url,
}

impl EmailApi {
    /// Creates a client for the API at `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::with_http_client(base_url, Client::new())
    }

    /// Creates a client sharing an existing HTTP client.
    #[must_use]
    pub const fn with_http_client(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    /// Base URL of the API.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lists messages in the order the server returns them.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] for non-2xx responses.
    pub async fn list_emails(&self, token: &str) -> Result<Vec<EmailSummary>, ApiError> {
        let url = self.endpoint(&[])?;
        let response = send(self.http.get(url), token).await?;
        let emails: Vec<EmailSummary> = response.json().await?;
        debug!("Listed {} emails", emails.len());
        Ok(emails)
    }

    /// Fetches the HTML body of one message.
    ///
    /// The server sends the body as a JSON string; a plain-text body is
    /// accepted as-is.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] for non-2xx responses.
    pub async fn get_email_body(&self, token: &str, internal_id: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&[internal_id])?;
        let response = send(self.http.get(url), token).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str::<String>(&text).unwrap_or(text))
    }

    /// Moves one message to `folder`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] for non-2xx responses.
    pub async fn move_email(
        &self,
        token: &str,
        internal_id: &str,
        folder: &Folder,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&[internal_id, "move", folder.as_str()])?;
        send(self.http.put(url), token).await?;
        debug!("Moved email to {folder}");
        Ok(())
    }

    /// `{base}/api/emails/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "emails"])
            .extend(segments);
        Ok(url)
    }
}

/// Sends an authenticated request and maps non-2xx responses to errors.
async fn send(request: RequestBuilder, token: &str) -> Result<Response, ApiError> {
    let response = request.bearer_auth(token).send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}
