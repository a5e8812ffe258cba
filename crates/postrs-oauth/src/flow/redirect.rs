//! Loopback listener that captures the authorization redirect.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};
use url::Url;

/// Upper bound on request head lines read before giving up on a connection.
const MAX_HEADER_LINES: usize = 100;

/// One-shot HTTP listener bound to the redirect URI's host and port.
///
/// Bind it before opening the browser so the redirect can never arrive
/// before something is listening for it.
#[derive(Debug)]
pub struct RedirectListener {
    listener: TcpListener,
    path: String,
}

impl RedirectListener {
    /// Binds to the loopback address named by `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is not an `http` loopback URI or the port
    /// cannot be bound.
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri)?;
        if url.scheme() != "http" {
            return Err(Error::InvalidConfig(format!(
                "redirect URI must use http on loopback, got {redirect_uri}"
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidConfig(format!("redirect URI has no host: {redirect_uri}")))?;
        let ip = match host {
            "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
            other => other
                .trim_matches(|c| c == '[' || c == ']')
                .parse::<IpAddr>()
                .map_err(|_| {
                    Error::InvalidConfig(format!("redirect URI host must be loopback: {other}"))
                })?,
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        debug!("Listening for authorization redirect on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            path: url.path().to_string(),
        })
    }

    /// Address actually bound (useful when the URI asked for port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the redirect and returns the authorization code.
    ///
    /// Requests for other paths (a browser probing `/favicon.ico`) are
    /// answered with 404 and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when nothing arrives in time,
    /// [`Error::AccessDenied`] when the user declined, and
    /// [`Error::StateMismatch`] when `state` does not match.
    pub async fn wait_for_code(&self, expected_state: &str, timeout_secs: u64) -> Result<String> {
        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.accept_code(expected_state),
        )
        .await
        .map_err(|_| Error::Timeout(timeout_secs))?
    }

    async fn accept_code(&self, expected_state: &str) -> Result<String> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;

            let target = match read_request_target(&mut stream).await {
                Ok(Some(target)) => target,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Dropping malformed redirect request from {peer}: {e}");
                    continue;
                }
            };

            let url = Url::parse("http://localhost/")?.join(&target)?;
            if url.path() != self.path {
                respond(&mut stream, "404 Not Found", "Not found").await;
                continue;
            }

            let outcome = parse_redirect(&url, expected_state);
            let page = match &outcome {
                Ok(_) => "Signed in. You can close this tab.",
                Err(Error::AccessDenied) => "Sign-in was cancelled. You can close this tab.",
                Err(_) => "Sign-in failed. Return to the terminal for details.",
            };
            respond(&mut stream, "200 OK", page).await;
            return outcome;
        }
    }
}

/// Reads the request head and returns the request target of the first line.
async fn read_request_target(stream: &mut TcpStream) -> Result<Option<String>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }

    // Drain headers so the client sees a clean response.
    let mut line = String::new();
    for _ in 0..MAX_HEADER_LINES {
        line.clear();
        if reader.read_line(&mut line).await? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(Some(target.to_string())),
        _ => Err(Error::InvalidResponse(format!(
            "unexpected request line: {}",
            request_line.trim_end()
        ))),
    }
}

/// Extracts the code from a redirect URL, checking `state` and `error`.
fn parse_redirect(url: &Url, expected_state: &str) -> Result<String> {
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        if error == "access_denied" {
            return Err(Error::AccessDenied);
        }
        let description = params.get("error_description").cloned().unwrap_or_default();
        return Err(Error::oauth_error(error.clone(), description));
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(Error::StateMismatch);
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or_else(|| Error::InvalidResponse("redirect carried no code".into()))
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("Failed to answer redirect request: {e}");
    }
    let _ = stream.shutdown().await;
}
