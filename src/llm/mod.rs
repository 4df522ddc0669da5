//! Chat-completion contract and the OpenAI-compatible HTTP adapter.
//!
//! The pipeline only ever talks to the model through [`ChatClient::complete`], so tests can swap in
//! scripted doubles. The HTTP adapter targets any service exposing `POST /chat/completions` in the
//! OpenAI wire format (Perplexity, OpenAI, vLLM, Ollama's compatibility layer).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by chat-completion providers.
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Provider could not be reached.
    #[error("LLM provider unreachable: {0}")]
    Transport(String),
    /// Call did not finish within the configured timeout.
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
    /// Provider answered with a non-success status code.
    #[error("LLM provider returned {status}: {body}")]
    Status {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },
    /// Provider response could not be parsed or carried no message.
    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// End-user content.
    User,
    /// Model output.
    Assistant,
}

/// One `{role, content}` entry of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send an ordered list of messages to `model` and return its reply.
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatMessage, LlmClientError>;
}

/// Run [`ChatClient::complete`] under a hard deadline.
pub async fn complete_with_timeout(
    client: &dyn ChatClient,
    model: &str,
    messages: Vec<ChatMessage>,
    timeout: Duration,
) -> Result<ChatMessage, LlmClientError> {
    tokio::time::timeout(timeout, client.complete(model, messages))
        .await
        .map_err(|_| LlmClientError::Timeout(timeout))?
}

/// Chat client speaking the OpenAI `chat/completions` wire format.
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    /// Build a client for `base_url`, applying `timeout` at the transport level as well.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmClientError> {
        let http = Client::builder()
            .user_agent("studyguide/llm")
            .timeout(timeout)
            .build()
            .map_err(|error| {
                LlmClientError::Transport(format!("failed to construct HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<ChatMessage>,
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatMessage, LlmClientError> {
        let payload = json!({
            "model": model,
            "messages": messages,
        });

        let mut request = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            LlmClientError::Transport(format!(
                "failed to reach LLM provider at {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::Status { status, body });
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            LlmClientError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        let message = body
            .choices
            .into_iter()
            .find_map(|choice| choice.message)
            .ok_or_else(|| LlmClientError::InvalidResponse("response carried no choices".into()))?;

        if message.content.trim().is_empty() {
            return Err(LlmClientError::InvalidResponse(
                "response message was empty".into(),
            ));
        }

        tracing::debug!(model, chars = message.content.len(), "Received completion");
        Ok(message)
    }
}
