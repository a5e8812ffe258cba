//! Email API data types.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One entry of the message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    /// Server-side message identifier.
    pub internal_id: String,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Sender display name.
    #[serde(default)]
    pub from_name: String,
    /// Sender address (omitted by some list responses).
    #[serde(default)]
    pub from_addr: String,
    /// Date the message was sent.
    #[serde(deserialize_with = "deserialize_date")]
    pub date: DateTime<Utc>,
}

impl EmailSummary {
    /// Sender as shown in lists: the name, or the address if there is none.
    #[must_use]
    pub fn sender(&self) -> &str {
        if self.from_name.is_empty() {
            &self.from_addr
        } else {
            &self.from_name
        }
    }
}

/// Accepts RFC 3339 and, as IMAP servers send it, RFC 2822.
fn deserialize_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .or_else(|_| DateTime::parse_from_rfc2822(&raw))
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| serde::de::Error::custom(format!("invalid date {raw:?}: {e}")))
}

/// A message with its HTML body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDetail {
    /// Summary fields.
    #[serde(flatten)]
    pub summary: EmailSummary,
    /// HTML body.
    pub body: String,
}

/// Destination folder for a move.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Folder {
    /// The archive folder.
    Archive,
    /// The junk/spam folder.
    Junk,
    /// Any other folder, by server name.
    Other(String),
}

impl Folder {
    /// Folder name as the server knows it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Archive => "Archive",
            Self::Junk => "Junk Email",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Folder {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "archive" => Self::Archive,
            "junk" | "junk email" | "spam" => Self::Junk,
            _ => Self::Other(s.to_string()),
        })
    }
}
