//! Interactive sign-in.

use postrs_oauth::RedirectListener;
use tracing::info;
use url::Url;

use crate::error::Result;
use crate::identity::OidcIdentity;
use crate::session::SessionManager;
use crate::store::SessionStore;

/// Runs the authorization code flow and installs the resulting session.
///
/// The redirect listener is bound before `open_browser` is called with the
/// authorization URL.
///
/// # Errors
///
/// Returns [`crate::Error::Auth`] when the flow fails or is cancelled, and
/// [`crate::Error::Session`] when the new session cannot be persisted.
pub async fn interactive_login<S, F>(
    session: &SessionManager<S, OidcIdentity>,
    timeout_secs: u64,
    open_browser: F,
) -> Result<()>
where
    S: SessionStore + 'static,
    F: FnOnce(&Url),
{
    let identity = session.provider();
    let listener = RedirectListener::bind(identity.redirect_uri()).await?;
    let flow = identity.authorization_flow().await?;
    let url = flow.authorization_url(None)?;

    open_browser(&url);

    let code = listener.wait_for_code(flow.state(), timeout_secs).await?;
    let token = flow.exchange_code(&code).await?;
    info!(
        offline = token.refresh_token.is_some(),
        "Authorization code exchanged"
    );

    session.login_with(token.into())?;
    Ok(())
}
