use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Immutable unit of work loaded from the task file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub instance_id: String,
    pub instruction: String,
    /// Database / context identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_id: Option<String>,
    /// Knowledge document name, relative to the documents folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_knowledge: Option<String>,
}

impl Task {
    pub fn new(instance_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            instruction: instruction.into(),
            db_id: None,
            external_knowledge: None,
        }
    }

    pub fn with_db_id(mut self, db_id: impl Into<String>) -> Self {
        self.db_id = Some(db_id.into());
        self
    }

    pub fn with_external_knowledge(mut self, name: impl Into<String>) -> Self {
        self.external_knowledge = Some(name.into());
        self
    }
}

/// Parse line-delimited task records. Blank lines are ignored; unknown
/// fields are tolerated.
pub fn parse_task_lines(input: &str) -> Result<Vec<Task>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| AgentError::InvalidTask {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

/// Read and parse a task file.
pub async fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<Task>> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_task_lines(&text)
}
