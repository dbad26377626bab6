//! Journal entries and their content blocks.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use crate::error::{Error, Result};

/// Calendar-date key of an entry (`YYYY-MM-DD`). One entry per user per day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DateId(String);

impl DateId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("date_id is required"));
        }
        let invalid = || Error::validation(format!("date_id must be YYYY-MM-DD, got {trimmed:?}"));
        // chrono tolerates a signed or unpadded year; the key must not.
        let year = trimmed.split('-').next().unwrap_or_default();
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())?;
        Ok(Self::from_date(date))
    }

    /// The canonical key for a calendar day. Every spelling of the same day
    /// maps to one key.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DateId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Image,
    Video,
    Document,
    Voice,
}

impl BlockKind {
    pub fn is_media(self) -> bool {
        !matches!(self, BlockKind::Text)
    }
}

/// One block of an entry.
///
/// Clients send ids and file sizes as either strings or numbers; both are
/// accepted and stored as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub kind: BlockKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(
        default,
        rename = "fileName",
        alias = "file_name",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_name: Option<String>,

    #[serde(
        default,
        rename = "fileSize",
        alias = "file_size",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_size: Option<String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: BlockKind::Text,
            text: Some(text.into()),
            caption: None,
            url: None,
            file_name: None,
            file_size: None,
        }
    }

    pub fn media(kind: BlockKind, url: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            text: None,
            caption: None,
            url: Some(url.into()),
            file_name: None,
            file_size: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Enforce the URL invariant.
    ///
    /// Media blocks always end up with a durable URL or the empty string;
    /// client-local references (`blob:`, `file:`) count as no URL. Text blocks
    /// never carry URL or file metadata.
    pub fn normalize(mut self) -> Self {
        if self.kind.is_media() {
            let url = self.url.take().unwrap_or_default();
            let local = url.starts_with("blob:") || url.starts_with("file:");
            self.url = Some(if local { String::new() } else { url });
            if self.kind != BlockKind::Document {
                self.file_name = None;
                self.file_size = None;
            }
        } else {
            self.url = None;
            self.file_name = None;
            self.file_size = None;
        }
        self
    }
}

fn default_title() -> String {
    "Untitled Entry".into()
}

fn default_theme() -> String {
    "light".into()
}

fn default_font() -> String {
    "Inter".into()
}

/// A stored journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub date_id: DateId,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub blocks: Vec<ContentBlock>,

    #[serde(default = "default_theme")]
    pub theme: String,

    #[serde(default = "default_font")]
    pub font: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JournalEntry {
    pub fn new(date_id: DateId) -> Self {
        Self {
            date_id,
            title: default_title(),
            blocks: Vec::new(),
            theme: default_theme(),
            font: default_font(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Text and captions of every block, newline-joined, blanks skipped.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .flat_map(|b| [b.text.as_deref(), b.caption.as_deref()])
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            date_id: self.date_id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            preview: self.blocks.first().cloned(),
        }
    }
}

/// Fields supplied by one save. `None` leaves the stored value untouched;
/// `blocks`, when present, replaces the stored list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<ContentBlock>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
}

impl EntryDraft {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_blocks(mut self, blocks: Vec<ContentBlock>) -> Self {
        self.blocks = Some(blocks);
        self
    }
}

/// What `list_entries` returns: no block content beyond the first block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub date_id: DateId,
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub preview: Option<ContentBlock>,
}
