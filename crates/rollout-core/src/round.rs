//! One request/response cycle of a rollout.
//!
//! A raw model reply moves the conversation to exactly one of four states:
//!
//! | reply                                  | outcome       | appended (model view)            |
//! |----------------------------------------|---------------|----------------------------------|
//! | `ERROR:` sentinel                      | `Failed`      | nothing                          |
//! | no parseable tool call                 | `Reprompt`    | raw reply, format reminder       |
//! | tool call naming `terminate`           | `Terminated`  | preserved text                   |
//! | other tool calls                       | `Dispatched`  | preserved text, one user turn per result |
//!
//! The audit view mirrors each step with the visible narration, the parsed
//! tool calls and tool-role results.

use std::sync::Arc;

use crate::domain::{AuditEntry, ConversationState, Message, Task};
use crate::error::Result;
use crate::executor::{ToolExecutor, ToolResult};
use crate::model::is_error_sentinel;
use crate::obs;
use crate::parser::ToolCallParser;
use crate::tools::ToolCall;

/// User turn sent when the reply carried no usable tool call.
pub const REPROMPT_TEXT: &str = "Please follow the <tool_call> tag format and return a <tool_call> tag containing function name and parameters.";

/// What one round did to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The reply had no usable tool call; the model was asked to reformat.
    Reprompt,
    /// Tool calls were executed and their results fed back.
    Dispatched { tool_calls: usize },
    /// The model called `terminate`.
    Terminated,
    /// The model client gave up; carries the sentinel text.
    Failed { error: String },
}

impl RoundOutcome {
    /// Whether the rollout should run another round.
    pub fn continues(&self) -> bool {
        matches!(self, RoundOutcome::Reprompt | RoundOutcome::Dispatched { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoundOutcome::Reprompt => "reprompt",
            RoundOutcome::Dispatched { .. } => "dispatched",
            RoundOutcome::Terminated => "terminated",
            RoundOutcome::Failed { .. } => "failed",
        }
    }
}

/// Applies model replies to a [`ConversationState`].
#[derive(Clone)]
pub struct ConversationRound {
    parser: Arc<ToolCallParser>,
    executor: Arc<dyn ToolExecutor>,
}

impl ConversationRound {
    pub fn new(parser: Arc<ToolCallParser>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { parser, executor }
    }

    /// Interpret `reply` for `task` and update `state`.
    ///
    /// A failed round leaves the state untouched and does not count toward
    /// the round limit; every other outcome advances `round_count` by one.
    pub async fn advance(
        &self,
        state: &mut ConversationState,
        task: &Task,
        reply: &str,
    ) -> Result<RoundOutcome> {
        if is_error_sentinel(reply) {
            return Ok(RoundOutcome::Failed {
                error: reply.to_string(),
            });
        }

        let parsed = self.parser.parse(reply, task);
        let outcome = if !parsed.has_tool_calls() {
            state.push_message(Message::assistant(reply))?;
            state.push_audit(AuditEntry::assistant(parsed.visible_prefix, Vec::new()))?;
            state.push_message(Message::user(REPROMPT_TEXT))?;
            state.push_audit(Message::user(REPROMPT_TEXT).into())?;
            RoundOutcome::Reprompt
        } else {
            let terminates = parsed.terminates();
            state.push_message(Message::assistant(parsed.preserved_text))?;
            state.push_audit(AuditEntry::assistant(
                parsed.visible_prefix,
                parsed.tool_calls.clone(),
            ))?;

            if terminates {
                state.mark_terminated();
                RoundOutcome::Terminated
            } else {
                let results = self.run_tools(&parsed.tool_calls).await;
                let tool_calls = results.len();
                for result in results {
                    state.push_audit(AuditEntry::tool(result.content.clone()))?;
                    state.push_message(Message::user(result.content))?;
                }
                RoundOutcome::Dispatched { tool_calls }
            }
        };

        state.finish_round();
        obs::emit_round_completed(state.round_count(), outcome.label());
        Ok(outcome)
    }

    /// Execute every non-terminate call, keeping input order. Dispatchable
    /// calls go out as one batch; unknown names get a local error result.
    async fn run_tools(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let pending: Vec<&ToolCall> = calls.iter().filter(|c| !c.is_terminate()).collect();
        let batch: Vec<ToolCall> = pending
            .iter()
            .filter(|c| c.kind.is_dispatchable())
            .map(|c| (*c).clone())
            .collect();

        let mut executed = self.executor.execute(&batch).await.into_iter();
        pending
            .into_iter()
            .map(|call| {
                if call.kind.is_dispatchable() {
                    executed.next().unwrap_or_else(|| {
                        ToolResult::error(format!("API error: no result for {}", call.name()))
                    })
                } else {
                    ToolResult::error(format!("Unknown tool: {}", call.name()))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::fakes::RecordingExecutor;
    use crate::tools::{ToolKind, ToolRegistry};
    use serde_json::Map;

    fn round() -> (ConversationRound, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::new());
        let parser = Arc::new(ToolCallParser::new(ToolRegistry::new(), None));
        (ConversationRound::new(parser, executor.clone()), executor)
    }

    fn fresh() -> ConversationState {
        ConversationState::new(vec![Message::system("sys"), Message::user("list tables")])
    }

    #[tokio::test]
    async fn test_plain_prose_reprompts() {
        let (round, executor) = round();
        let mut state = fresh();
        let task = Task::new("t1", "list tables");

        let outcome = round
            .advance(&mut state, &task, "I think there are tables.")
            .await
            .unwrap();

        assert_eq!(outcome, RoundOutcome::Reprompt);
        assert_eq!(state.round_count(), 1);
        assert!(!state.is_terminated());
        let tail = &state.messages()[2..];
        assert_eq!(tail[0], Message::assistant("I think there are tables."));
        assert_eq!(tail[1], Message::user(REPROMPT_TEXT));
        assert_eq!(state.audit()[2].tool_calls, Some(vec![]));
        assert!(executor.batches().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_block_reprompts_with_raw_reply() {
        let (round, _) = round();
        let mut state = fresh();
        let reply = "Let me try.\n<tool_call>{not json</tool_call>";

        let outcome = round
            .advance(&mut state, &Task::new("t1", "q"), reply)
            .await
            .unwrap();

        assert_eq!(outcome, RoundOutcome::Reprompt);
        assert_eq!(state.messages()[2].content, reply);
        assert_eq!(state.audit()[2].content, "Let me try.");
    }

    #[tokio::test]
    async fn test_terminate_closes_conversation() {
        let (round, executor) = round();
        let mut state = fresh();
        let reply = "Done.<tool_call><function=terminate></function></tool_call> trailing";

        let outcome = round
            .advance(&mut state, &Task::new("t1", "q"), reply)
            .await
            .unwrap();

        assert_eq!(outcome, RoundOutcome::Terminated);
        assert!(state.is_terminated());
        assert_eq!(state.messages().len(), 3);
        assert_eq!(
            state.messages()[2].content,
            "Done.<tool_call><function=terminate></function></tool_call>"
        );
        assert!(executor.batches().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_feeds_results_back_as_user_turns() {
        let (round, executor) = round();
        let mut state = fresh();
        let reply = "<tool_call><function=execute_database_sql><parameter=sql>SHOW TABLES</parameter></function></tool_call>";

        let outcome = round
            .advance(&mut state, &Task::new("t1", "q"), reply)
            .await
            .unwrap();

        assert_eq!(outcome, RoundOutcome::Dispatched { tool_calls: 1 });
        assert_eq!(executor.batches().len(), 1);
        assert_eq!(
            executor.batches()[0][0].argument_str("sql"),
            Some("SHOW TABLES")
        );
        let last = state.messages().last().unwrap();
        assert_eq!(*last, Message::user("execute_database_sql ok"));
        let audit_last = state.audit().last().unwrap();
        assert_eq!(audit_last.role, Role::Tool);
        assert_eq!(audit_last.content, "execute_database_sql ok");
    }

    #[tokio::test]
    async fn test_sentinel_fails_without_touching_state() {
        let (round, _) = round();
        let mut state = fresh();
        let before = state.clone();

        let outcome = round
            .advance(&mut state, &Task::new("t1", "q"), "ERROR: Failed to get LLM response")
            .await
            .unwrap();

        assert!(matches!(outcome, RoundOutcome::Failed { .. }));
        assert!(!outcome.continues());
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_unknown_tool_gets_local_error_in_order() {
        let (round, executor) = round();
        let calls = vec![
            ToolCall::new(ToolKind::Unknown("fly".into()), Map::new()),
            ToolCall::new(ToolKind::Shell, Map::new()),
            ToolCall::new(ToolKind::Terminate, Map::new()),
        ];

        let results = round.run_tools(&calls).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "Unknown tool: fly");
        assert!(results[0].is_error());
        assert_eq!(results[1].content, "execute_bash ok");
        assert_eq!(executor.batches(), vec![vec![calls[1].clone()]]);
    }
}
