//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use postrs_core::Folder;

/// Read and triage mail from the postrs email API.
#[derive(Parser, Debug)]
#[command(name = "postrs", version)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Email API base URL, overriding the config file
    #[arg(long, global = true, env = "POSTRS_API_URL")]
    pub api_url: Option<String>,

    /// Refresh on startup when the stored session has no known expiry
    #[arg(long, global = true)]
    pub validate: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in through the browser
    Login {
        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show whether a session is present and when it expires
    Status,
    /// List messages
    List,
    /// Show one message
    Show {
        /// Message id, as printed by `list`
        id: String,
        /// Print the raw HTML instead of converting it to Markdown
        #[arg(long)]
        html: bool,
    },
    /// Move a message to the archive
    Archive {
        /// Message id
        id: String,
    },
    /// Move a message to junk
    Spam {
        /// Message id
        id: String,
    },
    /// Move a message to a folder
    Move {
        /// Message id
        id: String,
        /// Destination folder (`archive`, `junk`, or a server folder name)
        folder: Folder,
    },
}
