use std::sync::Arc;

use crate::config::ModelSettings;
use crate::domain::Message;
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};

use super::backend::{ChatBackend, ChatRequest, FragmentSink};

/// Prefix of the reply returned once all attempts are exhausted.
pub const ERROR_SENTINEL_PREFIX: &str = "ERROR:";

/// Whether a model reply is the exhausted-retries sentinel.
pub fn is_error_sentinel(reply: &str) -> bool {
    reply.starts_with(ERROR_SENTINEL_PREFIX)
}

/// Retrying model client.
///
/// `call` never fails: transport and backend errors are retried under the
/// [`RetryPolicy`], and after the last attempt an `ERROR:`-prefixed string
/// is returned in place of a reply. The worker calling it stays occupied for
/// the whole backoff.
pub struct ModelClient {
    backend: Arc<dyn ChatBackend>,
    settings: ModelSettings,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ChatBackend>, settings: ModelSettings) -> Self {
        Self {
            backend,
            settings,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub async fn call(
        &self,
        messages: &[Message],
        streaming: bool,
        sink: Option<&dyn FragmentSink>,
    ) -> String {
        let request = ChatRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            max_tokens: self.settings.max_new_tokens,
            stream: streaming,
        };
        let max_attempts = self.retry.attempts();
        let mut attempt = 0;

        loop {
            match self.backend.complete(&request, sink).await {
                Ok(reply) => return reply,
                Err(err) => {
                    attempt += 1;
                    METRICS.inc_model_failures();
                    if attempt >= max_attempts {
                        obs::emit_model_exhausted(max_attempts, &err);
                        return format!(
                            "{ERROR_SENTINEL_PREFIX} Failed to get LLM response after {max_attempts} attempts: {err}"
                        );
                    }
                    let wait = self.retry.delay_for(attempt);
                    obs::emit_model_retry(attempt, max_attempts, wait, &err);
                    self.sleeper.sleep(wait).await;
                }
            }
        }
    }
}
