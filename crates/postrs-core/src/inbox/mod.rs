//! Presentation state for the message list and message view.
//!
//! Each operation takes `&mut self` and applies its result only once the
//! request completes; a screen that drops the future (navigates away)
//! discards the result without touching its state.

use crate::api::{ApiError, EmailApi, EmailDetail, EmailSummary, Folder};
use crate::identity::IdentityProvider;
use crate::session::{SessionError, SessionManager};
use crate::store::SessionStore;

/// Errors a screen shows to the user.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    /// No usable token; the user must sign in again.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ScreenError {
    /// Returns true if signing in again is the way out.
    #[must_use]
    pub const fn needs_login(&self) -> bool {
        match self {
            Self::Session(
                SessionError::NotAuthenticated
                | SessionError::NoRefreshToken
                | SessionError::RefreshFailed { .. },
            ) => true,
            Self::Api(e) => e.is_unauthorized(),
            Self::Session(_) => false,
        }
    }
}

/// The message list screen.
#[derive(Debug, Default)]
pub struct Inbox {
    emails: Vec<EmailSummary>,
    last_error: Option<String>,
}

impl Inbox {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently shown, in server order.
    #[must_use]
    pub fn emails(&self) -> &[EmailSummary] {
        &self.emails
    }

    /// Message shown for the last failed operation, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Looks up a listed message.
    #[must_use]
    pub fn find(&self, internal_id: &str) -> Option<&EmailSummary> {
        self.emails.iter().find(|e| e.internal_id == internal_id)
    }

    /// Replaces the list with the server's. On error the list is unchanged.
    ///
    /// # Errors
    ///
    /// Returns the session or API error, which is also kept for display.
    pub async fn reload<S, P>(
        &mut self,
        api: &EmailApi,
        session: &SessionManager<S, P>,
    ) -> Result<(), ScreenError>
    where
        S: SessionStore + 'static,
        P: IdentityProvider,
    {
        match fetch_list(api, session).await {
            Ok(emails) => {
                self.emails = emails;
                self.last_error = None;
                Ok(())
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Moves a message and removes it from the list once the server agrees.
    ///
    /// # Errors
    ///
    /// Returns the session or API error; the list is then unchanged.
    pub async fn move_email<S, P>(
        &mut self,
        api: &EmailApi,
        session: &SessionManager<S, P>,
        internal_id: &str,
        folder: &Folder,
    ) -> Result<(), ScreenError>
    where
        S: SessionStore + 'static,
        P: IdentityProvider,
    {
        match request_move(api, session, internal_id, folder).await {
            Ok(()) => {
                self.emails.retain(|e| e.internal_id != internal_id);
                self.last_error = None;
                Ok(())
            }
            Err(e) => Err(self.record(e)),
        }
    }

    fn record(&mut self, error: ScreenError) -> ScreenError {
        self.last_error = Some(error.to_string());
        error
    }
}

async fn fetch_list<S, P>(
    api: &EmailApi,
    session: &SessionManager<S, P>,
) -> Result<Vec<EmailSummary>, ScreenError>
where
    S: SessionStore + 'static,
    P: IdentityProvider,
{
    let token = session.valid_token().await?;
    Ok(api.list_emails(&token).await?)
}

async fn request_move<S, P>(
    api: &EmailApi,
    session: &SessionManager<S, P>,
    internal_id: &str,
    folder: &Folder,
) -> Result<(), ScreenError>
where
    S: SessionStore + 'static,
    P: IdentityProvider,
{
    let token = session.valid_token().await?;
    api.move_email(&token, internal_id, folder).await?;
    Ok(())
}

/// The message view screen; the body is fetched on first [`Self::load`].
#[derive(Debug)]
pub struct MessageView {
    summary: EmailSummary,
    body: Option<String>,
}

impl MessageView {
    /// Creates a view for a listed message.
    #[must_use]
    pub const fn new(summary: EmailSummary) -> Self {
        Self {
            summary,
            body: None,
        }
    }

    /// The message's list entry.
    #[must_use]
    pub const fn summary(&self) -> &EmailSummary {
        &self.summary
    }

    /// The body, once loaded.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Fetches the body unless it is already loaded.
    ///
    /// # Errors
    ///
    /// Returns the session or API error.
    pub async fn load<S, P>(
        &mut self,
        api: &EmailApi,
        session: &SessionManager<S, P>,
    ) -> Result<&str, ScreenError>
    where
        S: SessionStore + 'static,
        P: IdentityProvider,
    {
        if self.body.is_none() {
            let token = session.valid_token().await?;
            let body = api
                .get_email_body(&token, &self.summary.internal_id)
                .await?;
            self.body = Some(body);
        }
        Ok(self.body.as_deref().unwrap_or_default())
    }

    /// The full message, once loaded.
    #[must_use]
    pub fn detail(&self) -> Option<EmailDetail> {
        self.body.as_ref().map(|body| EmailDetail {
            summary: self.summary.clone(),
            body: body.clone(),
        })
    }
}
