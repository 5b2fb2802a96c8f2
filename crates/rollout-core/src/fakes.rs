//! In-process fakes for the model, tool and sleep seams (testing only)
//!
//! Lets rollouts run end to end without a model server, a tool endpoint or
//! real backoff waits.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Message;
use crate::executor::{ToolExecutor, ToolResult};
use crate::model::{BackendError, ChatBackend, ChatRequest, FragmentSink};
use crate::retry::Sleeper;
use crate::tools::ToolCall;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Chat backend replaying a fixed script of replies.
///
/// Once the script is exhausted every call fails with a transport error.
/// Each request's messages are recorded for later inspection.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_outcomes(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = Result<String, BackendError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Messages of every request received so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        request: &ChatRequest<'_>,
        sink: Option<&dyn FragmentSink>,
    ) -> Result<String, BackendError> {
        lock(&self.requests).push(request.messages.to_vec());
        let next = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Transport("script exhausted".into())));
        if let (Ok(text), true, Some(sink)) = (&next, request.stream, sink) {
            for piece in text.split_inclusive(' ') {
                sink.on_fragment(piece);
            }
        }
        next
    }
}

/// Tool executor answering each call with `"<name> ok"` and recording the
/// batches it received.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    batches: Mutex<Vec<Vec<ToolCall>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<ToolCall>> {
        lock(&self.batches).clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }
        lock(&self.batches).push(calls.to_vec());
        calls
            .iter()
            .map(|c| ToolResult::new(format!("{} ok", c.name())))
            .collect()
    }
}

/// Sleeper that returns immediately and remembers the requested waits.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        lock(&self.waits).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.waits).push(duration);
    }
}
