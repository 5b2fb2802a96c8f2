use async_trait::async_trait;
use serde::Serialize;

use crate::domain::Message;

/// Chat-completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Receives streamed text fragments as they arrive.
pub trait FragmentSink: Send + Sync {
    fn on_fragment(&self, fragment: &str);
}

impl<F> FragmentSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_fragment(&self, fragment: &str) {
        self(fragment)
    }
}

/// A single failed request. Every variant is treated as transient.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err.to_string())
    }
}

/// One chat-completion round trip, no retries.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Return the full response text. When `request.stream` is set the
    /// backend forwards each fragment to `sink` before returning.
    async fn complete(
        &self,
        request: &ChatRequest<'_>,
        sink: Option<&dyn FragmentSink>,
    ) -> Result<String, BackendError>;
}
