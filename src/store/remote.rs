//! HTTP adapter to the external conversation store.
//!
//! The store (Redis/Postgres behind its own service) is consumed through a
//! narrow REST interface; this adapter owns the only network I/O on the
//! session path. Every call carries a bounded timeout; timeouts surface as
//! `StoreTimeout` and connection failures as `StoreUnavailable`, both
//! retried through [`RetryPolicy`] before reaching the client. Ownership is
//! enforced store-side against the normalized identity this adapter
//! forwards; the append is a single store call so the message insert and the
//! session-metadata update commit together.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use super::SessionStore;
use super::model::{ChatMessage, ChatSession, MessageRole, SessionFilter, SortBy, SortOrder};
use crate::auth::normalize;
use crate::config::RetryConfig;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Session store adapter speaking HTTP to the backing conversation store.
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RemoteStore {
    /// Create an adapter for the store at `base_url` with a per-call timeout.
    pub fn new(base_url: &str, timeout: Duration, retry: &RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("store HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_config(retry),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(map_transport_error)?;
        map_status(response)
    }
}

/// Map reqwest transport failures to the retryable store error kinds.
fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::StoreTimeout(e.to_string())
    } else {
        Error::StoreUnavailable(e.to_string())
    }
}

/// Map store response statuses to gateway errors. 404 and 403 keep their
/// distinct internal kinds; the router collapses them on the wire.
fn map_status(response: reqwest::Response) -> Result<reqwest::Response> {
    match response.status() {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(Error::SessionNotFound("remote".to_string())),
        StatusCode::FORBIDDEN => Err(Error::OwnershipMismatch("remote".to_string())),
        StatusCode::GATEWAY_TIMEOUT => Err(Error::StoreTimeout("remote store".to_string())),
        s if s.is_server_error() => Err(Error::StoreUnavailable(format!("store returned {s}"))),
        s => Err(Error::Internal(format!("unexpected store status {s}"))),
    }
}

fn sort_params(filter: &SessionFilter) -> (&'static str, &'static str) {
    let sort_by = match filter.sort_by {
        SortBy::CreatedAt => "created_at",
        SortBy::UpdatedAt => "updated_at",
    };
    let sort_order = match filter.sort_order {
        SortOrder::Desc => "desc",
        SortOrder::Asc => "asc",
    };
    (sort_by, sort_order)
}

#[async_trait::async_trait]
impl SessionStore for RemoteStore {
    async fn create_session(&self, identity: &str, first_message: &str) -> Result<ChatSession> {
        let owner = normalize(identity);
        let url = format!("{}/sessions", self.base_url);
        let body = json!({ "ownerIdentity": owner, "firstMessage": first_message });

        self.retry
            .run(|| async {
                let response = self.send(self.client.post(&url).json(&body)).await?;
                response
                    .json::<ChatSession>()
                    .await
                    .map_err(map_transport_error)
            })
            .await
    }

    async fn list_sessions(
        &self,
        identity: &str,
        filter: &SessionFilter,
    ) -> Result<Vec<ChatSession>> {
        let owner = normalize(identity);
        let url = format!("{}/sessions", self.base_url);
        let (sort_by, sort_order) = sort_params(filter);
        let limit = filter.effective_limit().to_string();

        self.retry
            .run(|| async {
                let mut request = self.client.get(&url).query(&[
                    ("ownerIdentity", owner.as_str()),
                    ("sortBy", sort_by),
                    ("sortOrder", sort_order),
                    ("limit", limit.as_str()),
                ]);
                if let Some(start) = filter.start_date {
                    request = request.query(&[("startDate", start.to_rfc3339())]);
                }
                if let Some(end) = filter.end_date {
                    request = request.query(&[("endDate", end.to_rfc3339())]);
                }
                let response = self.send(request).await?;
                response
                    .json::<Vec<ChatSession>>()
                    .await
                    .map_err(map_transport_error)
            })
            .await
    }

    async fn get_messages(&self, identity: &str, session_id: &str) -> Result<Vec<ChatMessage>> {
        let owner = normalize(identity);
        let url = format!("{}/sessions/{session_id}/messages", self.base_url);

        self.retry
            .run(|| async {
                let response = self
                    .send(
                        self.client
                            .get(&url)
                            .query(&[("ownerIdentity", owner.as_str())]),
                    )
                    .await?;
                response
                    .json::<Vec<ChatMessage>>()
                    .await
                    .map_err(map_transport_error)
            })
            .await
    }

    async fn append_message(
        &self,
        identity: &str,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let owner = normalize(identity);
        let url = format!("{}/sessions/{session_id}/messages", self.base_url);
        let body = json!({ "ownerIdentity": owner, "role": role, "content": content });

        // One POST: the store commits the message insert and the session
        // metadata update in a single transaction. A retried timeout may
        // duplicate the append but can never half-apply it.
        self.retry
            .run(|| async {
                let response = self.send(self.client.post(&url).json(&body)).await?;
                response
                    .json::<ChatMessage>()
                    .await
                    .map_err(map_transport_error)
            })
            .await
    }

    async fn delete_session(&self, identity: &str, session_id: &str) -> Result<()> {
        let owner = normalize(identity);
        let url = format!("{}/sessions/{session_id}", self.base_url);

        self.retry
            .run(|| async {
                self.send(
                    self.client
                        .delete(&url)
                        .query(&[("ownerIdentity", owner.as_str())]),
                )
                .await?;
                Ok(())
            })
            .await
    }
}
