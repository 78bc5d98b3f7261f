//! In-memory session store.
//!
//! Backs tests and self-contained deployments. Each session lives in its own
//! mutex-guarded slot so an append updates the message list and the three
//! session-metadata fields (`last_message`, `message_count`, `updated_at`)
//! under one lock, so concurrent appends interleave but never lose a count.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::model::{ChatMessage, ChatSession, MessageRole, SessionFilter, SortBy, SortOrder};
use super::{SessionStore, derive_title};
use crate::auth::normalize;
use crate::{Error, Result};

struct Slot {
    session: ChatSession,
    messages: Vec<ChatMessage>,
}

/// DashMap of per-session slots; the map handles concurrent session-level
/// access, the per-slot mutex makes the append update atomic.
#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<String, Arc<Mutex<Slot>>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with an explicit creation time. The trait method
    /// delegates here with `Utc::now()`; tests use it to seed history on
    /// specific days.
    pub fn create_session_at(
        &self,
        identity: &str,
        first_message: &str,
        now: DateTime<Utc>,
    ) -> ChatSession {
        let owner = normalize(identity);
        let session_id = Uuid::new_v4().to_string();
        let session = ChatSession {
            session_id: session_id.clone(),
            owner_identity: owner,
            title: derive_title(first_message),
            first_message: first_message.to_string(),
            last_message: first_message.to_string(),
            message_count: 1,
            created_at: now,
            updated_at: now,
        };
        let first = ChatMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.clone(),
            role: MessageRole::User,
            content: first_message.to_string(),
            timestamp: now,
            metadata: serde_json::Value::Null,
        };
        self.sessions.insert(
            session_id,
            Arc::new(Mutex::new(Slot {
                session: session.clone(),
                messages: vec![first],
            })),
        );
        session
    }

    /// Fetch a slot, mapping absence to `SessionNotFound`.
    fn slot(&self, session_id: &str) -> Result<Arc<Mutex<Slot>>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }
}

/// Ownership check shared by all read/write paths. Runs inside the slot
/// lock, before any data is read or mutated.
fn check_owner(session: &ChatSession, identity: &str) -> Result<()> {
    if session.owner_identity == normalize(identity) {
        Ok(())
    } else {
        Err(Error::OwnershipMismatch(session.session_id.clone()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, identity: &str, first_message: &str) -> Result<ChatSession> {
        Ok(self.create_session_at(identity, first_message, Utc::now()))
    }

    async fn list_sessions(
        &self,
        identity: &str,
        filter: &SessionFilter,
    ) -> Result<Vec<ChatSession>> {
        let owner = normalize(identity);
        let mut sessions: Vec<ChatSession> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let slot = entry.value().lock();
                (slot.session.owner_identity == owner && filter.matches(slot.session.created_at))
                    .then(|| slot.session.clone())
            })
            .collect();

        sessions.sort_by(|a, b| {
            let key = |s: &ChatSession| match filter.sort_by {
                SortBy::CreatedAt => s.created_at,
                SortBy::UpdatedAt => s.updated_at,
            };
            match filter.sort_order {
                SortOrder::Desc => key(b).cmp(&key(a)),
                SortOrder::Asc => key(a).cmp(&key(b)),
            }
        });
        sessions.truncate(filter.effective_limit());
        Ok(sessions)
    }

    async fn get_messages(&self, identity: &str, session_id: &str) -> Result<Vec<ChatMessage>> {
        let slot = self.slot(session_id)?;
        let slot = slot.lock();
        check_owner(&slot.session, identity)?;
        Ok(slot.messages.clone())
    }

    async fn append_message(
        &self,
        identity: &str,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let slot = self.slot(session_id)?;
        let mut slot = slot.lock();
        check_owner(&slot.session, identity)?;

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        };

        // Message append and the three metadata fields change under one
        // lock: no interleaving can observe a message without its count.
        slot.messages.push(message.clone());
        slot.session.last_message = content.to_string();
        slot.session.message_count += 1;
        slot.session.updated_at = message.timestamp;

        Ok(message)
    }

    async fn delete_session(&self, identity: &str, session_id: &str) -> Result<()> {
        // Check ownership while holding the slot, then remove from the map.
        {
            let slot = self.slot(session_id)?;
            let slot = slot.lock();
            check_owner(&slot.session, identity)?;
        }
        self.sessions.remove(session_id);
        Ok(())
    }
}
