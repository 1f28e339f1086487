use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on one exchange, connect through body
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single exchange with the chat backend
#[derive(Debug, Error)]
pub enum ChatError {
    /// The backend answered with a non-2xx status
    #[error("API error: {}", .status.as_u16())]
    Status { status: StatusCode, body: String },

    /// The request never produced a response, or timed out
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response body was not the expected JSON
    #[error("invalid response body: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    conversation_id: &'a str,
    user_text: &'a str,
}

/// Body of a successful `/api/v1/chat` call
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send(&self, conversation_id: &str, user_text: &str) -> Result<ChatReply, ChatError> {
        let url = format!("{}/api/v1/chat", self.base_url);

        let request = ChatRequest {
            conversation_id,
            user_text,
        };

        tracing::debug!(%url, conversation_id, "sending chat request");

        // `.json()` sets Content-Type: application/json
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(ChatError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "chat backend returned an error");
            return Err(ChatError::Status { status, body });
        }

        let reply: ChatReply = response.json().await.map_err(body_error)?;
        if let Some(summary) = &reply.summary {
            tracing::debug!(summary = %summary, "conversation summary");
        }
        Ok(reply)
    }

    /// Probe `GET /health`; true when the backend reports `"ok"`
    pub async fn health(&self) -> Result<bool, ChatError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ChatError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        let health: HealthResponse = response.json().await.map_err(body_error)?;
        Ok(health.status == "ok")
    }
}

/// A body read cut short by the timeout is a transport failure, not bad JSON
fn body_error(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Transport(e)
    } else {
        ChatError::Decode(e)
    }
}
