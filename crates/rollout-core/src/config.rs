//! Runtime configuration for the rollout pipeline.
//!
//! Every struct has a `Default` matching the command-line defaults, so tests
//! and embedders only override what they care about.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Sampling settings sent with every chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_new_tokens: 4096,
        }
    }
}

/// Default per-request limit for chat completions, streamed or not.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Connection to an OpenAI-compatible chat-completion backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub api_base: String,
    pub api_key: Option<String>,
    /// A request still unanswered after this long fails as a transport
    /// error and goes through the retry policy.
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: std::env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl BackendConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Chat-completions endpoint derived from the base URL.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

/// Remote tool execution endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEndpointConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for ToolEndpointConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ToolEndpointConfig {
    pub fn execute_url(&self) -> String {
        format!("http://{}:{}/execute", self.host, self.port)
    }
}

/// Round and concurrency budget for a scheduling pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutConfig {
    pub max_rounds: u32,
    pub num_workers: usize,
    /// Rollouts required per task.
    pub rollout_quota: u32,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            num_workers: 4,
            rollout_quota: 1,
        }
    }
}

/// Database flavour the agent is told it is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Mysql,
    Postgresql,
    Sqlite,
    Snowflake,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Postgresql => "postgresql",
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Snowflake => "snowflake",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(DatabaseType::Mysql),
            "postgresql" | "postgres" => Ok(DatabaseType::Postgresql),
            "sqlite" => Ok(DatabaseType::Sqlite),
            "snowflake" => Ok(DatabaseType::Snowflake),
            other => Err(AgentError::Config(format!("unsupported database type: {other}"))),
        }
    }
}

/// Inputs of the file-based prompt builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub system_prompt_path: PathBuf,
    /// Root holding one folder per database id; also the shell tool's work_dir root.
    pub databases_path: Option<PathBuf>,
    pub documents_path: Option<PathBuf>,
    pub database_type: DatabaseType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let backend = BackendConfig::new("http://localhost:8000/v1/");
        assert_eq!(
            backend.completions_url(),
            "http://localhost:8000/v1/chat/completions"
        );
        assert_eq!(
            ToolEndpointConfig::default().execute_url(),
            "http://localhost:5000/execute"
        );
    }

    #[test]
    fn test_database_type_parsing() {
        assert_eq!("SQLite".parse::<DatabaseType>().unwrap(), DatabaseType::Sqlite);
        assert_eq!(
            "postgres".parse::<DatabaseType>().unwrap(),
            DatabaseType::Postgresql
        );
        assert!("oracle".parse::<DatabaseType>().is_err());
        assert_eq!(DatabaseType::default().to_string(), "mysql");
    }

    #[test]
    fn test_defaults() {
        let rollout = RolloutConfig::default();
        assert_eq!(rollout.max_rounds, 20);
        assert_eq!(rollout.num_workers, 4);
        assert_eq!(rollout.rollout_quota, 1);
        assert_eq!(ToolEndpointConfig::default().timeout, Duration::from_secs(30));
        assert_eq!(
            BackendConfig::new("http://localhost:8000/v1").timeout,
            Duration::from_secs(600)
        );
    }
}
