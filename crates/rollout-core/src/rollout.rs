//! The per-unit pipeline: prompt, then rounds until terminate, failure or
//! the round limit.

use std::sync::Arc;
use std::time::Instant;

use rollout_store::RolloutRecord;
use serde_json::Value;
use tracing::Instrument;

use crate::domain::{ConversationState, Task};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::model::{FragmentSink, ModelClient};
use crate::obs;
use crate::prompt::{ChatExchange, PromptBuilder};
use crate::round::{ConversationRound, RoundOutcome};

/// How a rollout ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutOutcome {
    /// The model called `terminate`.
    Terminated,
    /// The round limit was reached first. Not an error.
    Incomplete,
    /// The model client gave up in round `round_failed`, or the unit
    /// faulted before any round ran.
    Failed {
        error: String,
        round_failed: Option<u32>,
    },
}

impl RolloutOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RolloutOutcome::Terminated => "terminated",
            RolloutOutcome::Incomplete => "incomplete",
            RolloutOutcome::Failed { .. } => "failed",
        }
    }
}

/// A finished rollout and its conversation.
#[derive(Debug, Clone)]
pub struct RolloutResult {
    pub instance_id: String,
    pub rollout_idx: u32,
    pub outcome: RolloutOutcome,
    pub state: ConversationState,
}

impl RolloutResult {
    /// Answer shown to an interactive user.
    pub fn final_answer(&self) -> String {
        match &self.outcome {
            RolloutOutcome::Failed { error, .. } => format!("Error: {error}"),
            _ => self
                .state
                .last_assistant_text()
                .unwrap_or("No response generated")
                .to_string(),
        }
    }

    /// Convert into the persisted record.
    pub fn to_record(&self) -> Result<RolloutRecord> {
        let record = match &self.outcome {
            RolloutOutcome::Failed {
                error,
                round_failed,
            } => RolloutRecord::failed(
                self.instance_id.clone(),
                self.rollout_idx,
                error.clone(),
                *round_failed,
            ),
            outcome => RolloutRecord::completed(
                self.instance_id.clone(),
                self.rollout_idx,
                to_values(self.state.audit())?,
                to_values(self.state.messages())?,
                *outcome == RolloutOutcome::Terminated,
            ),
        };
        Ok(record)
    }
}

fn to_values<T: serde::Serialize>(items: &[T]) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(Into::into))
        .collect()
}

/// Runs whole rollouts.
#[derive(Clone)]
pub struct RolloutRunner {
    model: Arc<ModelClient>,
    round: ConversationRound,
    prompts: Arc<dyn PromptBuilder>,
    max_rounds: u32,
}

impl RolloutRunner {
    pub fn new(
        model: Arc<ModelClient>,
        round: ConversationRound,
        prompts: Arc<dyn PromptBuilder>,
        max_rounds: u32,
    ) -> Self {
        Self {
            model,
            round,
            prompts,
            max_rounds,
        }
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Batch rollout: no history, non-streaming model calls.
    pub async fn run(&self, task: &Task, rollout_idx: u32) -> Result<RolloutResult> {
        self.drive(task, rollout_idx, &[], None)
            .instrument(obs::rollout_span(&task.instance_id, rollout_idx))
            .await
    }

    /// Interactive rollout: prior exchanges as context, reply streamed to
    /// `sink` as it arrives.
    pub async fn run_interactive(
        &self,
        task: &Task,
        history: &[ChatExchange],
        sink: &dyn FragmentSink,
    ) -> Result<RolloutResult> {
        self.drive(task, 0, history, Some(sink))
            .instrument(obs::rollout_span(&task.instance_id, 0))
            .await
    }

    /// Batch rollout converted to its record. Pipeline errors become a
    /// failed record instead of propagating.
    pub async fn run_unit(&self, task: &Task, rollout_idx: u32) -> RolloutRecord {
        let converted = match self.run(task, rollout_idx).await {
            Ok(result) => result.to_record(),
            Err(e) => Err(e),
        };
        converted.unwrap_or_else(|e| {
            obs::emit_unit_failed(&task.instance_id, rollout_idx, &e);
            RolloutRecord::failed(task.instance_id.clone(), rollout_idx, e.to_string(), None)
        })
    }

    async fn drive(
        &self,
        task: &Task,
        rollout_idx: u32,
        history: &[ChatExchange],
        sink: Option<&dyn FragmentSink>,
    ) -> Result<RolloutResult> {
        let started = Instant::now();
        obs::emit_rollout_started(&task.instance_id, rollout_idx);

        let initial = self.prompts.build_initial(task, history).await?;
        let mut state = ConversationState::new(initial);
        let mut outcome = RolloutOutcome::Incomplete;

        while state.round_count() < self.max_rounds {
            let reply = self
                .model
                .call(state.messages(), sink.is_some(), sink)
                .await;
            match self.round.advance(&mut state, task, &reply).await? {
                RoundOutcome::Terminated => {
                    outcome = RolloutOutcome::Terminated;
                    break;
                }
                RoundOutcome::Failed { error } => {
                    outcome = RolloutOutcome::Failed {
                        error,
                        round_failed: Some(state.round_count() + 1),
                    };
                    break;
                }
                RoundOutcome::Reprompt | RoundOutcome::Dispatched { .. } => {}
            }
        }

        match outcome {
            RolloutOutcome::Terminated => METRICS.inc_rollouts_terminated(),
            RolloutOutcome::Incomplete => METRICS.inc_rollouts_incomplete(),
            RolloutOutcome::Failed { .. } => METRICS.inc_rollouts_failed(),
        }
        obs::emit_rollout_finished(
            &task.instance_id,
            rollout_idx,
            state.round_count(),
            outcome.status(),
            started.elapsed().as_millis() as u64,
        );

        Ok(RolloutResult {
            instance_id: task.instance_id.clone(),
            rollout_idx,
            outcome,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSettings;
    use crate::domain::Message;
    use crate::fakes::{RecordingExecutor, RecordingSleeper, ScriptedBackend};
    use crate::parser::ToolCallParser;
    use crate::retry::RetryPolicy;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticPrompt;

    #[async_trait]
    impl PromptBuilder for StaticPrompt {
        async fn build_initial(
            &self,
            task: &Task,
            _history: &[ChatExchange],
        ) -> Result<Vec<Message>> {
            Ok(vec![
                Message::system("sys"),
                Message::user(task.instruction.clone()),
            ])
        }
    }

    fn runner(backend: ScriptedBackend, max_rounds: u32) -> RolloutRunner {
        let model = ModelClient::new(Arc::new(backend), ModelSettings::default())
            .with_retry_policy(RetryPolicy::new(2, Duration::from_secs(1)))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        let round = ConversationRound::new(
            Arc::new(ToolCallParser::new(ToolRegistry::new(), None)),
            Arc::new(RecordingExecutor::new()),
        );
        RolloutRunner::new(Arc::new(model), round, Arc::new(StaticPrompt), max_rounds)
    }

    #[tokio::test]
    async fn test_round_limit_is_incomplete_not_error() {
        let backend = ScriptedBackend::new(["prose", "more prose", "still prose"]);
        let result = runner(backend, 2)
            .run(&Task::new("t1", "q"), 0)
            .await
            .unwrap();

        assert_eq!(result.outcome, RolloutOutcome::Incomplete);
        assert_eq!(result.state.round_count(), 2);
        let record = result.to_record().unwrap();
        assert!(record.is_completed());
        assert!(!record.terminated());
    }

    #[tokio::test]
    async fn test_exhausted_model_records_failed_round() {
        let backend = ScriptedBackend::new(["prose"]);
        let result = runner(backend, 5)
            .run(&Task::new("t1", "q"), 3)
            .await
            .unwrap();

        match &result.outcome {
            RolloutOutcome::Failed {
                error,
                round_failed,
            } => {
                assert!(error.starts_with("ERROR:"));
                assert_eq!(*round_failed, Some(2));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let record = result.to_record().unwrap();
        assert!(!record.is_completed());
        assert_eq!(record.rollout_idx, 3);
        assert!(result.final_answer().starts_with("Error: ERROR:"));
    }

    #[tokio::test]
    async fn test_final_answer_is_last_visible_assistant_text() {
        let backend = ScriptedBackend::new([
            "Here are the tables.<tool_call><function=terminate></function></tool_call>",
        ]);
        let result = runner(backend, 5)
            .run(&Task::new("t1", "q"), 0)
            .await
            .unwrap();

        assert_eq!(result.outcome, RolloutOutcome::Terminated);
        assert_eq!(result.final_answer(), "Here are the tables.");
    }
}
