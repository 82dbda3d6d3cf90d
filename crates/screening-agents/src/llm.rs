//! Model-call boundary: OpenAI-compatible chat completions over reqwest.
//!
//! [`call_structured`] is the only path role adapters use: it retries
//! transport failures under a [`RetryPolicy`] and then runs the recovery
//! parser over the reply.

use std::time::Duration;

use async_trait::async_trait;
use coordination::recovery::{recover, Recovery};
use coordination::{Retriable, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::Endpoint;

/// Errors from a model call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    Protocol(String),

    #[error("model output could not be parsed: {preview}")]
    Unparseable { preview: String },
}

impl Retriable for CallError {
    /// Connection failures, rate limits and server errors are transient;
    /// client errors and unparseable output are not.
    fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Protocol(_) | Self::Unparseable { .. } => false,
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send `messages` and return the reply text. `expect_structured` asks
    /// the backend for a JSON object response.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        expect_structured: bool,
    ) -> Result<String, CallError>;
}

/// Client for `{base_url}/chat/completions`.
pub struct OpenAiCompatClient {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(endpoint: Endpoint) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| CallError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { endpoint, client })
    }

    pub fn model(&self) -> &str {
        &self.endpoint.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.url.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[ChatMessage], expect_structured: bool) -> Value {
        let mut body = serde_json::json!({
            "model": self.endpoint.model,
            "messages": messages,
            "temperature": self.endpoint.temperature,
        });
        if expect_structured {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        expect_structured: bool,
    ) -> Result<String, CallError> {
        let start = std::time::Instant::now();
        let mut request = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(&self.request_body(messages, expect_structured));
        if let Some(key) = &self.endpoint.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Status { status, body });
        }

        let resp_json: Value = response
            .json()
            .await
            .map_err(|e| CallError::Protocol(e.to_string()))?;

        let content = completion_content(&resp_json)?;
        debug!(
            model = %self.endpoint.model,
            chars = content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(content)
    }
}

/// Pull `choices[0].message.content` out of a completion response.
fn completion_content(resp: &Value) -> Result<String, CallError> {
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CallError::Protocol("missing choices[0].message.content".into()))
}

/// Call the model with retries, then recover a JSON value from the reply.
pub async fn call_structured(
    client: &dyn ModelClient,
    policy: &RetryPolicy,
    label: &str,
    messages: &[ChatMessage],
) -> Result<Value, CallError> {
    let reply = policy
        .run(label, |_attempt| client.chat(messages, true))
        .await?;

    match recover(&reply) {
        Recovery::Parsed { value, stage } => {
            debug!(call = label, stage = %stage, "structured output recovered");
            Ok(value)
        }
        Recovery::Unparseable { preview } => Err(CallError::Unparseable { preview }),
    }
}
