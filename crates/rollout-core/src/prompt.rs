//! Initial conversation construction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{DatabaseType, PromptConfig};
use crate::domain::{Message, Task};
use crate::error::Result;

/// System prompt used when the configured prompt file cannot be read.
pub const FALLBACK_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant with access to database and system tools.";

/// Placeholder `db_id` meaning "no particular database".
pub const GENERAL_DB_ID: &str = "GENERAL";

const HISTORY_WINDOW: usize = 5;
const HISTORY_ANSWER_CHARS: usize = 200;

/// One finished interactive exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatExchange {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Builds the messages a rollout starts from.
#[async_trait]
pub trait PromptBuilder: Send + Sync {
    /// `history` is empty in batch mode.
    async fn build_initial(&self, task: &Task, history: &[ChatExchange]) -> Result<Vec<Message>>;
}

/// Prompt builder reading the system prompt, schemas and knowledge
/// documents from disk.
///
/// The system prompt file is read once at construction. Schema and
/// knowledge files are read per task; anything missing degrades to a short
/// notice rather than an error.
#[derive(Debug, Clone)]
pub struct FilePromptBuilder {
    system_prompt: String,
    databases_path: Option<PathBuf>,
    documents_path: Option<PathBuf>,
    database_type: DatabaseType,
}

impl FilePromptBuilder {
    pub async fn load(config: &PromptConfig) -> Self {
        let system_prompt = match tokio::fs::read_to_string(&config.system_prompt_path).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(
                    path = %config.system_prompt_path.display(),
                    error = %e,
                    "could not load system prompt, using fallback"
                );
                FALLBACK_SYSTEM_PROMPT.to_string()
            }
        };
        Self {
            system_prompt,
            databases_path: config.databases_path.clone(),
            documents_path: config.documents_path.clone(),
            database_type: config.database_type,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    async fn database_info(&self, db_id: Option<&str>) -> String {
        let db_type = self.database_type;
        let (Some(root), Some(db_id)) = (self.databases_path.as_deref(), db_id) else {
            return format!("Connected to {db_type} database. Use execute_database_sql to query.");
        };
        if db_id.is_empty() || db_id == GENERAL_DB_ID {
            return format!("Connected to {db_type} database. Use execute_database_sql to query.");
        }

        let schema = root
            .join(db_id)
            .join("database_description")
            .join("schema.sql");
        match read_optional(&schema).await {
            Some(text) => text,
            None => format!(
                "Connected to {db_type} database '{db_id}'. Use execute_database_sql to query."
            ),
        }
    }

    async fn external_knowledge(&self, name: Option<&str>) -> Option<String> {
        let path = self.documents_path.as_deref()?.join(name?);
        read_optional(&path).await
    }
}

#[async_trait]
impl PromptBuilder for FilePromptBuilder {
    async fn build_initial(&self, task: &Task, history: &[ChatExchange]) -> Result<Vec<Message>> {
        let mut system = self.system_prompt.clone();

        let db_info = self.database_info(task.db_id.as_deref()).await;
        system.push_str("\n\nDatabase Information:\n");
        system.push_str(&db_info);

        if let Some(knowledge) = self
            .external_knowledge(task.external_knowledge.as_deref())
            .await
        {
            system.push_str("\n\nExternal Knowledge:\n");
            system.push_str(&knowledge);
        }

        let mut messages = vec![Message::system(system)];
        if let Some(context) = format_history(history) {
            messages.push(Message::user(context));
        }
        if !task.instruction.is_empty() {
            messages.push(Message::user(task.instruction.clone()));
        }
        Ok(messages)
    }
}

/// Summarise the most recent exchanges as a context message.
pub fn format_history(history: &[ChatExchange]) -> Option<String> {
    if history.is_empty() {
        return None;
    }
    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

    let mut lines = vec!["Previous conversation context:".to_string()];
    for (i, exchange) in recent.iter().enumerate() {
        lines.push(format!("Exchange {}:", i + 1));
        lines.push(format!("User: {}", exchange.user));
        lines.push(format!("Assistant: {}", truncate(&exchange.assistant)));
        lines.push(String::new());
    }
    Some(lines.join("\n"))
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(HISTORY_ANSWER_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

async fn read_optional(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read prompt file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> PromptConfig {
        PromptConfig {
            system_prompt_path: dir.path().join("system.txt"),
            databases_path: Some(dir.path().join("databases")),
            documents_path: Some(dir.path().join("documents")),
            database_type: DatabaseType::Sqlite,
        }
    }

    #[tokio::test]
    async fn test_missing_prompt_file_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let builder = FilePromptBuilder::load(&config(&dir)).await;
        assert_eq!(builder.system_prompt(), FALLBACK_SYSTEM_PROMPT);

        let messages = builder
            .build_initial(&Task::new("t1", "list tables"), &[])
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.ends_with(
            "Database Information:\nConnected to sqlite database. Use execute_database_sql to query."
        ));
        assert_eq!(messages[1], Message::user("list tables"));
    }

    #[tokio::test]
    async fn test_schema_and_knowledge_are_appended() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("system.txt"), "  You answer questions.\n").unwrap();
        let schema_dir = dir.path().join("databases/shop/database_description");
        std::fs::create_dir_all(&schema_dir).unwrap();
        std::fs::write(schema_dir.join("schema.sql"), "CREATE TABLE orders (id INT);\n").unwrap();
        std::fs::create_dir_all(dir.path().join("documents")).unwrap();
        std::fs::write(dir.path().join("documents/fiscal.md"), "Year starts in April.").unwrap();

        let builder = FilePromptBuilder::load(&config(&dir)).await;
        let task = Task::new("t1", "revenue?")
            .with_db_id("shop")
            .with_external_knowledge("fiscal.md");
        let messages = builder.build_initial(&task, &[]).await.unwrap();

        assert_eq!(
            messages[0].content,
            "You answer questions.\n\nDatabase Information:\nCREATE TABLE orders (id INT);\n\nExternal Knowledge:\nYear starts in April."
        );
    }

    #[tokio::test]
    async fn test_unknown_database_gets_named_notice() {
        let dir = TempDir::new().unwrap();
        let builder = FilePromptBuilder::load(&config(&dir)).await;
        let task = Task::new("t1", "q").with_db_id("missing");
        let messages = builder.build_initial(&task, &[]).await.unwrap();
        assert!(messages[0]
            .content
            .contains("Connected to sqlite database 'missing'."));
    }

    #[tokio::test]
    async fn test_history_becomes_context_message() {
        let dir = TempDir::new().unwrap();
        let builder = FilePromptBuilder::load(&config(&dir)).await;
        let history = vec![ChatExchange::new("hi", "hello")];
        let messages = builder
            .build_initial(&Task::new("chat_1", "and now?"), &history)
            .await
            .unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1]
            .content
            .starts_with("Previous conversation context:\nExchange 1:\nUser: hi\nAssistant: hello"));
    }

    #[test]
    fn test_history_window_and_truncation() {
        let history: Vec<_> = (0..7)
            .map(|i| ChatExchange::new(format!("q{i}"), "a".repeat(250)))
            .collect();
        let text = format_history(&history).unwrap();

        assert!(!text.contains("User: q1\n"));
        assert!(text.contains("Exchange 1:\nUser: q2"));
        assert!(text.contains("Exchange 5:\nUser: q6"));
        assert!(text.contains(&format!("Assistant: {}...", "a".repeat(200))));
        assert!(format_history(&[]).is_none());
    }
}
