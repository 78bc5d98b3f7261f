//! Completion provider abstraction.
//!
//! The gateway treats inference as an opaque call behind
//! [`CompletionProvider`]: a prompt goes in after authorization, a reply
//! comes out. The HTTP implementation speaks the OpenAI-style
//! chat-completions shape. Provider failures map to `Error::Provider` so the
//! client can tell a backend outage apart from an auth rejection.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::{Error, Result};

/// Opaque completion backend invoked only after a request is authorized.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce a reply for the prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// HTTP provider for OpenAI-compatible chat-completions endpoints.
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpCompletionProvider {
    /// Build a provider from config. The API key is resolved once here,
    /// never logged.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("provider HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
        })
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Provider(format!("provider returned {status}")));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("malformed provider response: {e}")))?;

        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Provider("provider returned no choices".to_string()))?;

        debug!(reply_chars = reply.chars().count(), "Provider reply received");
        Ok(reply)
    }
}
