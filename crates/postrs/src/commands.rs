//! Command handlers.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local, Utc};
use postrs_core::{
    AppConfig, EmailApi, EmailSummary, Folder, Inbox, InitOptions, KeyringStore, MessageView,
    OidcIdentity, SessionManager, interactive_login,
};
use tracing::{debug, warn};
use url::Url;

use crate::cli::Command;

/// Width of the sender column in `list`.
const SENDER_WIDTH: usize = 24;

/// Everything a command needs, built once at startup.
pub struct App {
    config: AppConfig,
    session: SessionManager<KeyringStore, OidcIdentity>,
    api: EmailApi,
}

impl App {
    /// Wires the keyring store, identity provider and API client together.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let http = config
            .http_client()
            .context("Cannot build the HTTP client")?;
        let api = EmailApi::with_http_client(config.api_base_url()?, http.clone());
        let identity = OidcIdentity::new(config.auth.clone(), http);
        let session = SessionManager::new(KeyringStore::new(), identity);
        Ok(Self {
            config,
            session,
            api,
        })
    }

    /// Runs one command.
    ///
    /// `logout` runs against storage alone. Every other command first
    /// restores the stored session, which may refresh it over the network.
    pub async fn run(&self, command: Command, eager_validation: bool) -> anyhow::Result<()> {
        if matches!(command, Command::Logout) {
            return self.logout();
        }

        let status = self
            .session
            .initialize(InitOptions { eager_validation })
            .await;
        debug!("Session after startup: {status}");

        match command {
            Command::Logout => self.logout(),
            Command::Login { no_browser } => self.login(no_browser).await,
            Command::Status => {
                self.status();
                Ok(())
            }
            Command::List => self.list().await,
            Command::Show { id, html } => self.show(&id, html).await,
            Command::Archive { id } => self.move_to(&id, &Folder::Archive).await,
            Command::Spam { id } => self.move_to(&id, &Folder::Junk).await,
            Command::Move { id, folder } => self.move_to(&id, &folder).await,
        }
    }

    async fn login(&self, no_browser: bool) -> anyhow::Result<()> {
        interactive_login(&self.session, self.config.login_timeout_secs, |url| {
            eprintln!("Sign in at:\n\n  {url}\n");
            if !no_browser {
                open_browser(url);
            }
        })
        .await
        .context("Sign-in failed")?;

        println!("Signed in.");
        Ok(())
    }

    fn logout(&self) -> anyhow::Result<()> {
        self.session
            .logout()
            .context("Signed out, but the stored session could not be fully removed")?;
        println!("Signed out.");
        Ok(())
    }

    fn status(&self) {
        let Some(session) = self.session.session() else {
            println!("Signed out.");
            return;
        };

        match session.expires_at {
            Some(expires_at) if session.is_expired() => {
                println!("Session expired at {}.", local_time(expires_at));
            }
            Some(expires_at) => println!("Signed in until {}.", local_time(expires_at)),
            None => println!("Signed in (expiry unknown)."),
        }
        if session.refresh_token.is_none() {
            println!("No refresh token; you will need to sign in again when it expires.");
        }
    }

    async fn list(&self) -> anyhow::Result<()> {
        let inbox = self.load_inbox().await?;
        if inbox.emails().is_empty() {
            println!("No messages.");
        }
        for email in inbox.emails() {
            println!("{}", list_line(email));
        }
        Ok(())
    }

    async fn show(&self, id: &str, html: bool) -> anyhow::Result<()> {
        let inbox = self.load_inbox().await?;
        let summary = inbox
            .find(id)
            .cloned()
            .ok_or_else(|| anyhow!("No message with id {id}"))?;

        let mut view = MessageView::new(summary);
        let body = view.load(&self.api, &self.session).await?.to_string();

        let summary = view.summary();
        println!("From:    {} <{}>", summary.from_name, summary.from_addr);
        println!("Date:    {}", local_time(summary.date));
        println!("Subject: {}", summary.subject);
        println!();
        if html {
            println!("{body}");
        } else {
            println!("{}", render_body(&body));
        }
        Ok(())
    }

    async fn move_to(&self, id: &str, folder: &Folder) -> anyhow::Result<()> {
        let mut inbox = Inbox::new();
        inbox
            .move_email(&self.api, &self.session, id, folder)
            .await?;
        println!("Moved {id} to {folder}.");
        Ok(())
    }

    async fn load_inbox(&self) -> anyhow::Result<Inbox> {
        let mut inbox = Inbox::new();
        inbox.reload(&self.api, &self.session).await?;
        Ok(inbox)
    }
}

fn open_browser(url: &Url) {
    if let Err(e) = opener::open_browser(url.as_str()) {
        warn!("Could not open a browser: {e}");
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn list_line(email: &EmailSummary) -> String {
    let sender: String = email.sender().chars().take(SENDER_WIDTH).collect();
    format!(
        "{}  {:<width$}  {}  [{}]",
        local_time(email.date),
        sender,
        email.subject,
        email.internal_id,
        width = SENDER_WIDTH
    )
}

/// Converts an HTML body to Markdown for the terminal, falling back to the
/// raw HTML.
fn render_body(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|e| {
        warn!("Could not convert message body: {e}");
        html.to_string()
    })
}
