//! Error taxonomy for the rollout pipeline.

use crate::domain::Role;

/// Errors produced while preparing or running a rollout.
///
/// Transient model failures and tool failures are not represented here:
/// the former end as an `ERROR:` sentinel reply, the latter as per-call
/// error results fed back into the conversation.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid task record on line {line}: {source}")]
    InvalidTask {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("conversation already terminated; refusing to append {role} message")]
    ConversationClosed { role: Role },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http client error: {0}")]
    Http(String),

    #[error("store error: {0}")]
    Store(#[from] rollout_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rollout operations.
pub type Result<T> = std::result::Result<T, AgentError>;
