//! rollout-agent - multi-turn tool-calling rollouts
//!
//! ## Commands
//!
//! - `run`: roll out every task of a JSONL input file, resuming from the
//!   results already in the output folder
//! - `chat`: interactive session with streamed replies

mod chat;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rollout_core::{
    load_tasks, BackendConfig, ConversationRound, DatabaseType, FilePromptBuilder,
    HttpToolExecutor, ModelClient, ModelSettings, OpenAiBackend, PromptConfig, RolloutConfig,
    RolloutRunner, RolloutScheduler, ToolCallParser, ToolEndpointConfig, ToolRegistry,
};
use rollout_store::{JsonlResultStore, ResultStore};
use tokio::sync::watch;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "rollout-agent")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-turn tool-calling rollouts against a chat model", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run rollouts for every task in an input file
    Run {
        /// Input JSONL file, one task per line
        #[arg(long)]
        input_file: PathBuf,

        /// Folder holding results.jsonl
        #[arg(long, default_value = "./chat_logs")]
        output_folder: PathBuf,

        /// Concurrent rollouts
        #[arg(long, default_value_t = 4)]
        num_threads: usize,

        /// Rollouts per task
        #[arg(long, default_value_t = 1)]
        rollout_number: u32,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Interactive chat session
    Chat {
        #[command(flatten)]
        agent: AgentArgs,
    },
}

/// Settings shared by batch and chat mode.
#[derive(Args, Debug, Clone)]
struct AgentArgs {
    /// System prompt file
    #[arg(long, default_value = "prompts/universal_agent.txt")]
    system_prompt_path: PathBuf,

    /// Root with one folder per database id
    #[arg(long)]
    databases_path: Option<PathBuf>,

    /// External knowledge documents
    #[arg(long)]
    documents_path: Option<PathBuf>,

    /// Database the agent is connected to (mysql, postgresql, sqlite, snowflake)
    #[arg(long, default_value = "mysql")]
    database_type: DatabaseType,

    /// Model name
    #[arg(long, default_value = "gpt-4")]
    model: String,

    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    #[arg(long, default_value_t = 0.9)]
    top_p: f32,

    #[arg(long, default_value_t = 4096)]
    max_new_tokens: u32,

    /// Chat-completion base URL
    #[arg(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Seconds before an unanswered model request fails and is retried
    #[arg(long, default_value_t = 600)]
    request_timeout: u64,

    /// Tool execution server host
    #[arg(long, default_value = "localhost")]
    api_host: String,

    /// Tool execution server port
    #[arg(long, default_value_t = 5000)]
    api_port: u16,

    /// Rounds per rollout before it is recorded as incomplete
    #[arg(long, default_value_t = 20)]
    max_rounds: u32,

    /// Extra tool names served by the execution endpoint
    #[arg(long = "extra-tool")]
    extra_tools: Vec<String>,
}

impl AgentArgs {
    async fn build_runner(&self) -> Result<RolloutRunner> {
        let backend = BackendConfig {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.request_timeout),
        };
        if backend.api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; requests are sent without authorization");
        }
        let settings = ModelSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_new_tokens: self.max_new_tokens,
        };
        let model = ModelClient::new(
            Arc::new(OpenAiBackend::new(&backend).context("Failed to build model client")?),
            settings,
        );

        let endpoint = ToolEndpointConfig {
            host: self.api_host.clone(),
            port: self.api_port,
            ..ToolEndpointConfig::default()
        };
        let executor =
            HttpToolExecutor::new(&endpoint).context("Failed to build tool executor client")?;

        let registry = self
            .extra_tools
            .iter()
            .fold(ToolRegistry::new(), |r, name| r.with_tool(name.clone()));
        let parser = ToolCallParser::new(registry, self.databases_path.clone());

        let prompts = FilePromptBuilder::load(&PromptConfig {
            system_prompt_path: self.system_prompt_path.clone(),
            databases_path: self.databases_path.clone(),
            documents_path: self.documents_path.clone(),
            database_type: self.database_type,
        })
        .await;

        info!(
            model = %self.model,
            endpoint = %endpoint.execute_url(),
            "initialized agent"
        );
        Ok(RolloutRunner::new(
            Arc::new(model),
            ConversationRound::new(Arc::new(parser), Arc::new(executor)),
            Arc::new(prompts),
            self.max_rounds,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rollout_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            input_file,
            output_folder,
            num_threads,
            rollout_number,
            agent,
        } => cmd_run(&input_file, &output_folder, num_threads, rollout_number, &agent).await,
        Commands::Chat { agent } => chat::cmd_chat(&agent).await,
    }
}

/// Exit status after a forced interrupt (128 + SIGINT).
const INTERRUPT_EXIT_CODE: i32 = 130;

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Stop starting units and let running ones finish.
    Drain,
    /// Leave immediately.
    Exit,
}

fn on_interrupt(received: u32) -> Interrupt {
    if received <= 1 {
        Interrupt::Drain
    } else {
        Interrupt::Exit
    }
}

async fn cmd_run(
    input_file: &Path,
    output_folder: &Path,
    num_threads: usize,
    rollout_number: u32,
    agent: &AgentArgs,
) -> Result<()> {
    let tasks = load_tasks(input_file)
        .await
        .with_context(|| format!("Failed to load tasks from {}", input_file.display()))?;
    let store = Arc::new(
        JsonlResultStore::open(output_folder)
            .await
            .with_context(|| format!("Failed to open output folder {}", output_folder.display()))?,
    );
    let ledger = store
        .load_ledger()
        .await
        .context("Failed to read previous results")?;
    info!(
        tasks = tasks.len(),
        completed = ledger.total(),
        results = %store.path().display(),
        "loaded tasks"
    );

    let runner = agent.build_runner().await?;
    let config = RolloutConfig {
        max_rounds: agent.max_rounds,
        num_workers: num_threads,
        rollout_quota: rollout_number,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut received = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            received += 1;
            match on_interrupt(received) {
                Interrupt::Drain => {
                    warn!("interrupt received; finishing running rollouts, press Ctrl-C again to exit");
                    let _ = shutdown_tx.send(true);
                }
                Interrupt::Exit => {
                    warn!("second interrupt received; exiting without waiting for running rollouts");
                    std::process::exit(INTERRUPT_EXIT_CODE);
                }
            }
        }
    });

    let report = RolloutScheduler::new(config)
        .with_shutdown(shutdown_rx)
        .run(tasks, &ledger, store.clone(), move |task, idx| {
            let runner = runner.clone();
            async move { runner.run_unit(&task, idx).await }
        })
        .await;

    println!(
        "Planned {} rollouts for {} tasks: {} run, {} skipped, {} cancelled",
        report.planned, report.total_tasks, report.dispatched, report.skipped, report.cancelled
    );
    println!(
        "Terminated: {}  Incomplete: {}  Failed: {}",
        report.terminated, report.incomplete, report.failed
    );
    println!("Results: {}", store.path().display());

    if report.persist_errors > 0 {
        anyhow::bail!(
            "{} finished rollouts could not be written to {}",
            report.persist_errors,
            store.path().display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["rollout-agent", "run", "--input-file", "tasks.jsonl"])
            .unwrap();
        let Commands::Run {
            output_folder,
            num_threads,
            rollout_number,
            agent,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(output_folder, PathBuf::from("./chat_logs"));
        assert_eq!(num_threads, 4);
        assert_eq!(rollout_number, 1);
        assert_eq!(agent.max_rounds, 20);
        assert_eq!(agent.api_port, 5000);
        assert_eq!(agent.database_type, DatabaseType::Mysql);
        assert_eq!(agent.request_timeout, 600);
    }

    #[test]
    fn test_request_timeout_flag() {
        let cli = Cli::try_parse_from(["rollout-agent", "chat", "--request-timeout", "45"]).unwrap();
        let Commands::Chat { agent } = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(agent.request_timeout, 45);
    }

    #[test]
    fn test_second_interrupt_exits() {
        assert_eq!(on_interrupt(1), Interrupt::Drain);
        assert_eq!(on_interrupt(2), Interrupt::Exit);
        assert_eq!(on_interrupt(5), Interrupt::Exit);
    }

    #[test]
    fn test_chat_flags() {
        let cli = Cli::try_parse_from([
            "rollout-agent",
            "--verbose",
            "chat",
            "--database-type",
            "sqlite",
            "--extra-tool",
            "web_search",
            "--max-rounds",
            "5",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Chat { agent } = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(agent.database_type, DatabaseType::Sqlite);
        assert_eq!(agent.extra_tools, vec!["web_search".to_string()]);
        assert_eq!(agent.max_rounds, 5);
    }

    #[test]
    fn test_rejects_unknown_database_type() {
        assert!(Cli::try_parse_from(["rollout-agent", "chat", "--database-type", "oracle"]).is_err());
    }
}
