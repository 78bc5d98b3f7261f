//! Temporal chat composition.
//!
//! The `/chat` operation is where the temporal parser meets the store. A
//! confident temporal reference in the user message narrows the session
//! listing to the parsed range; the matching history is summarized into a
//! context preamble for the completion provider. An empty range
//! short-circuits with a fixed reply and never invokes the provider.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;
use crate::provider::CompletionProvider;
use crate::store::{SessionFilter, SessionStore};
use crate::temporal::{self, CONFIDENCE_THRESHOLD, TemporalRange};

/// Sessions fed into the provider context at most
const CONTEXT_SESSION_LIMIT: usize = 20;

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message, possibly containing a temporal reference
    pub message: String,
}

/// Chat response body, serialized camelCase like the session types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Provider reply, or the fixed no-history reply
    pub reply: String,
    /// How many stored sessions informed the reply
    pub sessions_considered: usize,
    /// The resolved temporal range, when one was parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

/// Wire shape of a resolved temporal range
#[derive(Debug, Serialize)]
pub struct TimeRange {
    /// Inclusive range start
    pub start: DateTime<Utc>,
    /// Inclusive range end
    pub end: DateTime<Utc>,
    /// The phrase the range was derived from
    pub description: String,
}

impl From<&TemporalRange> for TimeRange {
    fn from(range: &TemporalRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
            description: range.description.clone(),
        }
    }
}

fn no_history_reply(description: &str) -> String {
    format!("I don't have any conversations recorded for {description}.")
}

/// Answer a chat message for a verified identity.
///
/// `now` is injected so tests can pin the clock; the handler passes
/// `Utc::now()`.
pub async fn respond(
    store: &Arc<dyn SessionStore>,
    provider: &Arc<dyn CompletionProvider>,
    identity: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<ChatResponse> {
    let range = temporal::parse(message, now).filter(|r| r.confidence >= CONFIDENCE_THRESHOLD);

    let Some(range) = range else {
        // Non-temporal message: straight to the provider
        let reply = provider.complete(message).await?;
        return Ok(ChatResponse {
            reply,
            sessions_considered: 0,
            time_range: None,
        });
    };

    debug!(
        description = %range.description,
        confidence = range.confidence,
        "Temporal reference resolved"
    );

    let filter = SessionFilter::between(range.start, range.end, CONTEXT_SESSION_LIMIT);
    let sessions = store.list_sessions(identity, &filter).await?;

    if sessions.is_empty() {
        // Fixed reply; the provider is not consulted for an empty range
        info!(description = %range.description, "No history in range");
        return Ok(ChatResponse {
            reply: no_history_reply(&range.description),
            sessions_considered: 0,
            time_range: Some(TimeRange::from(&range)),
        });
    }

    let prompt = contextual_prompt(message, &range, &sessions);
    let reply = provider.complete(&prompt).await?;

    Ok(ChatResponse {
        reply,
        sessions_considered: sessions.len(),
        time_range: Some(TimeRange::from(&range)),
    })
}

/// Prepend a summary of the matching history to the user's message.
fn contextual_prompt(
    message: &str,
    range: &TemporalRange,
    sessions: &[crate::store::ChatSession],
) -> String {
    let mut prompt = format!(
        "The user is asking about their conversation history from {} \
         ({} session{} found):\n",
        range.description,
        sessions.len(),
        if sessions.len() == 1 { "" } else { "s" },
    );
    for session in sessions {
        prompt.push_str(&format!(
            "- {} (started {}, {} messages)\n",
            session.title,
            session.created_at.format("%Y-%m-%d %H:%M UTC"),
            session.message_count,
        ));
    }
    prompt.push_str("\nUser message: ");
    prompt.push_str(message);
    prompt
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store::{ChatSession, MemoryStore};
    use crate::{Error, Result};

    /// Provider stub that counts invocations.
    struct CountingProvider {
        calls: std::sync::atomic::AtomicUsize,
        reply: String,
    }

    impl CountingProvider {
        fn new(reply: &str) -> Self {
            Self {
                calls: std::sync::atomic::AtomicUsize::new(0),
                reply: reply.to_string(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl CompletionProvider for CountingProvider {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    /// Provider stub that always fails.
    struct FailingProvider;

    #[async_trait::async_trait]
    impl CompletionProvider for FailingProvider {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::Provider("backend down".to_string()))
        }
    }

    const OWNER: &str = "owner@example.com";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 14, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn non_temporal_message_goes_straight_to_the_provider() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let counting = Arc::new(CountingProvider::new("direct reply"));
        let provider: Arc<dyn CompletionProvider> = counting.clone();

        let response = respond(&store, &provider, OWNER, "explain borrowing", fixed_now())
            .await
            .unwrap();

        assert_eq!(response.reply, "direct reply");
        assert_eq!(response.sessions_considered, 0);
        assert!(response.time_range.is_none());
        assert_eq!(counting.calls(), 1);
    }

    #[tokio::test]
    async fn empty_range_short_circuits_without_a_provider_call() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let counting = Arc::new(CountingProvider::new("unused"));
        let provider: Arc<dyn CompletionProvider> = counting.clone();

        let response = respond(
            &store,
            &provider,
            OWNER,
            "what did we do yesterday?",
            fixed_now(),
        )
        .await
        .unwrap();

        assert_eq!(response.sessions_considered, 0);
        assert!(response.reply.contains("yesterday"));
        assert!(response.time_range.is_some());
        assert_eq!(counting.calls(), 0, "provider must not run for empty history");
    }

    #[tokio::test]
    async fn matching_history_is_summarized_into_the_prompt() {
        let memory = MemoryStore::new();
        let yesterday = Utc.with_ymd_and_hms(2024, 5, 14, 9, 0, 0).unwrap();
        memory.create_session_at(OWNER, "Trip planning for Lisbon", yesterday);
        let store: Arc<dyn SessionStore> = Arc::new(memory);
        let counting = Arc::new(CountingProvider::new("you planned a trip"));
        let provider: Arc<dyn CompletionProvider> = counting.clone();

        let response = respond(
            &store,
            &provider,
            OWNER,
            "what did we talk about yesterday?",
            fixed_now(),
        )
        .await
        .unwrap();

        assert_eq!(response.sessions_considered, 1);
        assert_eq!(response.reply, "you planned a trip");
        assert_eq!(counting.calls(), 1);
        let range = response.time_range.unwrap();
        assert_eq!(range.start.date_naive(), yesterday.date_naive());
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_provider_error() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let provider: Arc<dyn CompletionProvider> = Arc::new(FailingProvider);

        let result = respond(&store, &provider, OWNER, "hello there", fixed_now()).await;
        assert!(matches!(result, Err(Error::Provider(_))));
    }

    #[test]
    fn context_prompt_names_session_titles() {
        let range = temporal::parse("yesterday", fixed_now()).unwrap();
        let session = ChatSession {
            session_id: "s1".to_string(),
            owner_identity: OWNER.to_string(),
            title: "Trip planning".to_string(),
            first_message: "plan a trip".to_string(),
            last_message: "done".to_string(),
            message_count: 4,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        };
        let prompt = contextual_prompt("what did we do?", &range, &[session]);
        assert!(prompt.contains("Trip planning"));
        assert!(prompt.contains("yesterday"));
        assert!(prompt.ends_with("what did we do?"));
    }
}
