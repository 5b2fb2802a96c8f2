//! OpenAI-compatible chat-completion backend.
//!
//! Non-streaming requests read `choices[0].message.content`. Streaming
//! requests parse the server-sent event stream, concatenating
//! `choices[0].delta.content` fragments until a `finish_reason` or the
//! `[DONE]` marker arrives.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{AgentError, Result};

use super::backend::{BackendError, ChatBackend, ChatRequest, FragmentSink};

/// HTTP backend for `/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("rollout-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Http(e.to_string()))?;
        Ok(Self {
            http,
            url: config.completions_url(),
            api_key: config.api_key.clone(),
        })
    }

    async fn read_streamed(
        response: reqwest::Response,
        sink: Option<&dyn FragmentSink>,
    ) -> std::result::Result<String, BackendError> {
        let mut stream = response.bytes_stream();
        let mut acc = SseAccumulator::default();
        while let Some(chunk) = stream.next().await {
            acc.feed(&chunk?, sink);
            if acc.finished {
                break;
            }
        }
        Ok(acc.content)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(
        &self,
        request: &ChatRequest<'_>,
        sink: Option<&dyn FragmentSink>,
    ) -> std::result::Result<String, BackendError> {
        let mut builder = self.http.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if request.stream {
            Self::read_streamed(response, sink).await
        } else {
            let body: Value = response.json().await?;
            extract_message_content(&body)
        }
    }
}

/// `choices[0].message.content`; a null content is an empty reply.
fn extract_message_content(body: &Value) -> std::result::Result<String, BackendError> {
    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| BackendError::Decode("response has no choices[0].message".to_string()))?;
    Ok(message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

/// Incremental SSE decoder. Bytes are buffered until a full line is
/// available so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
struct SseAccumulator {
    pending: Vec<u8>,
    content: String,
    finished: bool,
}

impl SseAccumulator {
    fn feed(&mut self, bytes: &[u8], sink: Option<&dyn FragmentSink>) {
        if self.finished {
            return;
        }
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\r', '\n']), sink);
            if self.finished {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str, sink: Option<&dyn FragmentSink>) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.finished = true;
            return;
        }

        let chunk: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "skipping unparseable SSE chunk");
                return;
            }
        };
        let Some(choice) = chunk.pointer("/choices/0") else {
            return;
        };
        if let Some(fragment) = choice.pointer("/delta/content").and_then(Value::as_str) {
            if !fragment.is_empty() {
                self.content.push_str(fragment);
                if let Some(sink) = sink {
                    sink.on_fragment(fragment);
                }
            }
        }
        if choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .is_some()
        {
            self.finished = true;
        }
    }
}
