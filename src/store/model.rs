//! Session and message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default page size for session listings
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Hard cap on session listings regardless of the requested limit
pub const MAX_LIST_LIMIT: usize = 100;

/// Maximum length of a derived session title, in characters
const TITLE_MAX_CHARS: usize = 60;

/// A conversation session. Created on the first user message; metadata is
/// updated on every appended message; `owner_identity` never changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Opaque session identifier
    pub session_id: String,
    /// Normalized identity that created the session; immutable
    pub owner_identity: String,
    /// Short title derived from the first message
    pub title: String,
    /// The message that created the session
    pub first_message: String,
    /// Content of the most recently appended message
    pub last_message: String,
    /// Number of messages in the session
    pub message_count: u64,
    /// Creation time; the field temporal filters apply to
    pub created_at: DateTime<Utc>,
    /// Time of the most recent append (or creation)
    pub updated_at: DateTime<Utc>,
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End-user authored
    User,
    /// Completion-provider authored
    Assistant,
}

/// A single conversation message. Append-only: never mutated after creation,
/// deleted only as a cascade of session deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Opaque message identifier
    pub id: String,
    /// Parent session
    pub session_id: String,
    /// Author role
    pub role: MessageRole,
    /// Message body
    pub content: String,
    /// Append time
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata attached at append time
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Sort field for session listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Sort on session creation time (default)
    #[default]
    CreatedAt,
    /// Sort on last-append time
    UpdatedAt,
}

/// Sort direction for session listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first (default)
    #[default]
    Desc,
    /// Oldest first
    Asc,
}

/// Listing filter. Date bounds are inclusive on both ends and apply to
/// `created_at`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    /// Inclusive lower bound on `created_at`
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub end_date: Option<DateTime<Utc>>,
    /// Page size; defaults to [`DEFAULT_LIST_LIMIT`], capped at [`MAX_LIST_LIMIT`]
    pub limit: Option<usize>,
    /// Sort field
    #[serde(default)]
    pub sort_by: SortBy,
    /// Sort direction
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl SessionFilter {
    /// Filter for an inclusive date range with an explicit limit
    #[must_use]
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>, limit: usize) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Effective page size after defaulting and capping
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }

    /// Whether a session's creation time falls inside the bounds
    #[must_use]
    pub fn matches(&self, created_at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start_date {
            if created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if created_at > end {
                return false;
            }
        }
        true
    }
}

/// Derive a session title from its first message: first line, truncated on a
/// character boundary.
#[must_use]
pub fn derive_title(first_message: &str) -> String {
    let line = first_message.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return "New conversation".to_string();
    }
    if line.chars().count() <= TITLE_MAX_CHARS {
        return line.to_string();
    }
    let truncated: String = line.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}…", truncated.trim_end())
}
