//! rollout-core: multi-turn tool-calling rollouts against a chat model.
//!
//! A rollout builds an initial prompt for a [`Task`], then repeats
//! [`ConversationRound`]s (model call, tool-call parsing, tool dispatch)
//! until the model calls `terminate`, the model client gives up, or the
//! round limit is reached. [`RolloutScheduler`] runs many rollouts over a
//! bounded worker pool and resumes from previously stored results.

pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod parser;
pub mod prompt;
pub mod retry;
pub mod rollout;
pub mod round;
pub mod scheduler;
pub mod telemetry;
pub mod tools;

pub use config::{
    BackendConfig, DatabaseType, ModelSettings, PromptConfig, RolloutConfig, ToolEndpointConfig,
};
pub use domain::{
    load_tasks, parse_task_lines, AuditEntry, ConversationState, Message, Role, Task,
};
pub use error::{AgentError, Result};
pub use executor::{HttpToolExecutor, ToolExecutor, ToolResult};
pub use model::{
    is_error_sentinel, BackendError, ChatBackend, FragmentSink, ModelClient, OpenAiBackend,
    ERROR_SENTINEL_PREFIX,
};
pub use parser::{BlockParseError, ParsedResponse, ToolCallParser};
pub use prompt::{ChatExchange, FilePromptBuilder, PromptBuilder};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use rollout::{RolloutOutcome, RolloutResult, RolloutRunner};
pub use round::{ConversationRound, RoundOutcome, REPROMPT_TEXT};
pub use scheduler::{plan_units, CompletionCounter, RolloutScheduler, SchedulerReport};
pub use telemetry::init_tracing;
pub use tools::{ToolCall, ToolKind, ToolRegistry};

/// Crate version, for `--version` output and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
