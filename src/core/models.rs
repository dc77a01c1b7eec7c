use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::checkpoint::Checkpoints;

/// Stable numeric identity of a channel (a Discord snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ChannelId)
    }
}

/// Identity of the guild whose directory resolves channel names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configured channel: either already canonical or a display name pending resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Id(ChannelId),
    Name(String),
}

impl ChannelRef {
    /// All-digit tokens are identities; anything else is a name (a leading `#` is dropped).
    ///
    /// An all-digit token too large for an id yields `None`; configuration loading rejects it first.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            return trimmed.parse().ok().map(ChannelRef::Id);
        }
        let name = trimmed.trim_start_matches('#').trim();
        if name.is_empty() {
            None
        } else {
            Some(ChannelRef::Name(name.to_string()))
        }
    }

    #[must_use]
    pub fn is_name(&self) -> bool {
        matches!(self, ChannelRef::Name(_))
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{id}"),
            ChannelRef::Name(name) => write!(f, "#{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub id: ChannelId,
    pub name: String,
}

/// One entry of a guild's channel directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub id: ChannelId,
    pub name: String,
    pub is_text: bool,
}

/// A message as returned by the source, before automated authors are filtered out.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMessage {
    pub id: String,
    pub author: String,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl From<SourceMessage> for Message {
    fn from(raw: SourceMessage) -> Self {
        Self {
            id: raw.id,
            author: raw.author,
            content: raw.content,
            timestamp: raw.timestamp,
            attachments: raw.attachments,
        }
    }
}

/// Where the next page of a channel's history starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// First page: everything posted after this instant.
    Since(DateTime<Utc>),
    /// Later pages: everything after this message id.
    AfterMessage(String),
}

#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<SourceMessage>,
    pub has_more: bool,
}

/// Ordered, de-duplicated messages of one channel for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBatch {
    pub messages: Vec<Message>,
    /// Set when the per-channel maximum stopped the fetch before the source ran out.
    pub truncated: bool,
}

impl MessageBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub summary_timestamp: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub messages_count: usize,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_messages: Option<Vec<Message>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Unresolved(String),
    NoNewMessages,
    FetchFailed(String),
    GenerationFailed(String),
    PersistenceFailed(String),
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unresolved(e) => write!(f, "unresolved: {e}"),
            SkipReason::NoNewMessages => write!(f, "no new messages"),
            SkipReason::FetchFailed(e) => write!(f, "fetch failed: {e}"),
            SkipReason::GenerationFailed(e) => write!(f, "generation failed: {e}"),
            SkipReason::PersistenceFailed(e) => write!(f, "persistence failed: {e}"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal state of one channel's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    Advanced {
        channel: ResolvedChannel,
        messages_count: usize,
        record_path: PathBuf,
        checkpoint: DateTime<Utc>,
    },
    Skipped {
        channel: String,
        reason: SkipReason,
    },
}

impl ChannelOutcome {
    #[must_use]
    pub fn is_advanced(&self) -> bool {
        matches!(self, ChannelOutcome::Advanced { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub period_end: DateTime<Utc>,
    pub outcomes: Vec<ChannelOutcome>,
    pub checkpoints: Checkpoints,
}

impl RunReport {
    #[must_use]
    pub fn advanced_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_advanced()).count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.advanced_count()
    }
}
