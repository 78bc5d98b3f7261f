//! Session store adapters.
//!
//! The gateway never caches sessions or messages; every operation goes
//! through a [`SessionStore`] implementation that enforces ownership at the
//! adapter boundary: a caller holding a valid token still cannot touch a
//! session whose `owner_identity` differs from its own verified identity.

mod memory;
mod model;
mod remote;

use std::sync::Arc;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use model::{
    ChatMessage, ChatSession, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT, MessageRole, SessionFilter,
    SortBy, SortOrder, derive_title,
};
pub use remote::RemoteStore;

use crate::Result;
use crate::config::{Config, StoreBackend};

/// Conversation store interface.
///
/// Every method takes the caller's *verified* identity and must reject
/// ownership mismatches before touching data. Implementations are the only
/// suspension points in a request and carry bounded timeouts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session owned by `identity` from its first user message.
    async fn create_session(&self, identity: &str, first_message: &str) -> Result<ChatSession>;

    /// List sessions owned by `identity`, newest first by default.
    /// Date bounds are inclusive; results are capped by the filter limit.
    async fn list_sessions(
        &self,
        identity: &str,
        filter: &SessionFilter,
    ) -> Result<Vec<ChatSession>>;

    /// All messages of an owned session, in append order.
    async fn get_messages(&self, identity: &str, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// Append a message and update the parent session's `last_message`,
    /// `message_count` and `updated_at` as one atomic operation.
    async fn append_message(
        &self,
        identity: &str,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage>;

    /// Delete an owned session and, as a cascade, its messages.
    async fn delete_session(&self, identity: &str, session_id: &str) -> Result<()>;
}

/// Build the configured store adapter.
///
/// # Errors
///
/// Returns `Error::Config` when the remote backend is selected without a URL
/// (also caught by `Config::validate`).
pub fn from_config(config: &Config) -> Result<Arc<dyn SessionStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Remote => {
            let url = config.store.url.as_deref().ok_or_else(|| {
                crate::Error::Config("store.url is required for the remote backend".to_string())
            })?;
            Ok(Arc::new(RemoteStore::new(
                url,
                config.store.timeout,
                &config.retry,
            )?))
        }
    }
}
