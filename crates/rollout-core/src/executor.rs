//! Remote tool execution.
//!
//! All calls of a round go out in one `POST /execute` request and come back
//! as one result per call, in order. Transport failures and malformed
//! responses never surface as errors: they become an `API error:` result
//! repeated once per requested call, so the 1:1 correspondence holds even on
//! total failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::ToolEndpointConfig;
use crate::error::{AgentError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::tools::ToolCall;

/// Outcome of one tool call, as fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    /// Any other fields the endpoint returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: Map::new(),
        }
    }

    /// Error result; the message doubles as the content the model sees.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut extra = Map::new();
        extra.insert("error".to_string(), Value::String(message.clone()));
        Self {
            content: message,
            extra,
        }
    }

    /// Interpret one element of the endpoint response. Objects without a
    /// string `content` fall back to the JSON rendering of the whole value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut object) => match object.remove("content") {
                Some(Value::String(content)) => Self {
                    content,
                    extra: object,
                },
                Some(other) => {
                    object.insert("content".to_string(), other);
                    Self::new(Value::Object(object).to_string())
                }
                None => Self::new(Value::Object(object).to_string()),
            },
            Value::String(content) => Self::new(content),
            other => Self::new(other.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.extra.contains_key("error")
    }
}

/// Executes a batch of tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Results have the same length and order as `calls`.
    async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolResult>;
}

/// [`ToolExecutor`] backed by the remote `/execute` endpoint.
#[derive(Debug, Clone)]
pub struct HttpToolExecutor {
    http: reqwest::Client,
    url: String,
}

impl HttpToolExecutor {
    pub fn new(config: &ToolEndpointConfig) -> Result<Self> {
        Self::with_url(config.execute_url(), config)
    }

    /// Use an explicit endpoint URL; only the timeout is taken from `config`.
    pub fn with_url(url: impl Into<String>, config: &ToolEndpointConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Http(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    async fn post(&self, calls: &[ToolCall]) -> std::result::Result<Value, reqwest::Error> {
        self.http
            .post(&self.url)
            .json(&json!({ "tool_calls": calls }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }
        for call in calls {
            obs::emit_tool_dispatched(call.name(), &call.arguments);
            METRICS.inc_tool_calls();
        }

        match self.post(calls).await {
            Ok(body) => {
                let results = shape_results(body, calls.len());
                for result in &results {
                    debug!(content = %preview(&result.content), "tool result");
                }
                results
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "tool execution request failed");
                repeat_error(&format!("API error: {e}"), calls.len())
            }
        }
    }
}

/// Map an endpoint response onto `expected` results.
///
/// Accepts an array of exactly `expected` elements, or a single object
/// when one call was sent. Anything else is an error for every call.
pub fn shape_results(body: Value, expected: usize) -> Vec<ToolResult> {
    match body {
        Value::Array(items) if items.len() == expected => {
            items.into_iter().map(ToolResult::from_value).collect()
        }
        Value::Object(_) if expected == 1 => vec![ToolResult::from_value(body)],
        other => {
            warn!(expected, "unexpected tool endpoint response shape");
            repeat_error(
                &format!("API error: unexpected response format: {other}"),
                expected,
            )
        }
    }
}

fn repeat_error(message: &str, count: usize) -> Vec<ToolResult> {
    vec![ToolResult::error(message); count]
}

fn preview(content: &str) -> String {
    const LIMIT: usize = 50;
    match content.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_of_matching_length() {
        let body = json!([{"content": "a", "rows": 3}, {"content": "b"}]);
        let results = shape_results(body, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "a");
        assert_eq!(results[0].extra["rows"], 3);
        assert_eq!(results[1].content, "b");
    }

    #[test]
    fn test_single_object_is_wrapped() {
        let results = shape_results(json!({"content": "only"}), 1);
        assert_eq!(results, vec![ToolResult::new("only")]);
    }

    #[test]
    fn test_length_mismatch_becomes_errors() {
        let results = shape_results(json!([{"content": "a"}]), 3);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.content.starts_with("API error:")));
        assert!(results.iter().all(ToolResult::is_error));
    }

    #[test]
    fn test_scalar_response_becomes_errors() {
        let results = shape_results(json!(42), 2);
        assert_eq!(results.len(), 2);
        assert!(results[0].content.starts_with("API error:"));
    }

    #[test]
    fn test_missing_content_falls_back_to_rendering() {
        let result = ToolResult::from_value(json!({"status": "ok"}));
        assert_eq!(result.content, r#"{"status":"ok"}"#);

        let non_string = ToolResult::from_value(json!({"content": 5}));
        assert_eq!(non_string.content, r#"{"content":5}"#);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(60);
        let short = preview(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 53);
        assert_eq!(preview("tiny"), "tiny");
    }
}
