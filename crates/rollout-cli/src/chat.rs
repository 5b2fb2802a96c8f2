//! Interactive chat mode.

use std::future::Future;
use std::io::Write;

use anyhow::{Context, Result};
use rollout_core::prompt::ChatExchange;
use rollout_core::Task;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::error;

use crate::AgentArgs;

/// Exchanges kept as context for the next question.
const HISTORY_LIMIT: usize = 10;

enum Command {
    Exit,
    Help,
    Clear,
    Skip,
    Ask(String),
}

fn classify(line: &str) -> Command {
    let input = line.trim();
    match input.to_lowercase().as_str() {
        "exit" | "quit" | "bye" => Command::Exit,
        "help" => Command::Help,
        "clear" => Command::Clear,
        "" => Command::Skip,
        _ => Command::Ask(input.to_string()),
    }
}

fn print_help() {
    println!("\nCommands:");
    println!("  help     - Show this help message");
    println!("  clear    - Clear conversation history");
    println!("  exit     - Exit the chat");
    println!("\nTools:");
    println!("  - execute_database_sql: Run SQL queries");
    println!("  - execute_bash: Run system commands");
    println!("  - terminate: Complete current task");
}

fn prompt() {
    print!("\nuser: ");
    let _ = std::io::stdout().flush();
}

/// Keep only the most recent exchanges.
fn remember(history: &mut Vec<ChatExchange>, exchange: ChatExchange) {
    history.push(exchange);
    if history.len() > HISTORY_LIMIT {
        let excess = history.len() - HISTORY_LIMIT;
        history.drain(..excess);
    }
}

/// Forward every Ctrl-C to a watch channel for the lifetime of the session,
/// so an interrupt is seen whether the loop is waiting on stdin or a reply.
fn watch_interrupts() -> watch::Receiver<()> {
    let (tx, rx) = watch::channel(());
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run `work` unless an interrupt arrives first. `None` means interrupted.
async fn interruptible<F: Future>(
    work: F,
    interrupts: &mut watch::Receiver<()>,
) -> Option<F::Output> {
    tokio::select! {
        output = work => Some(output),
        Ok(()) = interrupts.changed() => None,
    }
}

pub(crate) async fn cmd_chat(agent: &AgentArgs) -> Result<()> {
    let runner = agent.build_runner().await?;

    println!("rollout-agent chat");
    println!("Connected to: {}", agent.database_type);
    println!("Type 'exit' or 'quit' to end the conversation, 'help' for commands");

    let mut interrupts = watch_interrupts();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ChatExchange> = Vec::new();

    loop {
        prompt();
        let line = match interruptible(lines.next_line(), &mut interrupts).await {
            Some(line) => line.context("Failed to read from stdin")?,
            None => None,
        };
        let Some(line) = line else {
            println!("\nGoodbye!");
            return Ok(());
        };

        let question = match classify(&line) {
            Command::Exit => {
                println!("Goodbye!");
                return Ok(());
            }
            Command::Help => {
                print_help();
                continue;
            }
            Command::Clear => {
                history.clear();
                println!("Conversation history cleared.");
                continue;
            }
            Command::Skip => continue,
            Command::Ask(question) => question,
        };

        let task = Task::new(format!("chat_{}", chrono::Utc::now().timestamp()), &question)
            .with_db_id(agent.database_type.as_str());
        let sink = |fragment: &str| {
            print!("{fragment}");
            let _ = std::io::stdout().flush();
        };

        print!("assistant: ");
        let reply = interruptible(runner.run_interactive(&task, &history, &sink), &mut interrupts);
        let Some(outcome) = reply.await else {
            println!("\nInterrupted. Goodbye!");
            return Ok(());
        };
        match outcome {
            Ok(result) => {
                println!();
                remember(&mut history, ChatExchange::new(question, result.final_answer()));
            }
            Err(e) => {
                error!(error = %e, "chat round failed");
                println!("\nError: {e}");
            }
        }
        println!("=============================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_commands() {
        assert!(matches!(classify("  EXIT "), Command::Exit));
        assert!(matches!(classify("bye"), Command::Exit));
        assert!(matches!(classify("help"), Command::Help));
        assert!(matches!(classify("clear"), Command::Clear));
        assert!(matches!(classify("   "), Command::Skip));
        match classify("  show tables ") {
            Command::Ask(q) => assert_eq!(q, "show tables"),
            _ => panic!("expected a question"),
        }
    }

    #[tokio::test]
    async fn test_interrupt_cancels_pending_work() {
        let (tx, mut rx) = watch::channel(());
        let work = async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            "reply"
        };
        let pending = interruptible(work, &mut rx);
        tx.send(()).unwrap();
        assert_eq!(pending.await, None);
    }

    #[tokio::test]
    async fn test_finished_work_wins_without_interrupt() {
        let (_tx, mut rx) = watch::channel(());
        assert_eq!(interruptible(async { 7 }, &mut rx).await, Some(7));
    }

    #[tokio::test]
    async fn test_interrupt_is_seen_after_earlier_wait() {
        let (tx, mut rx) = watch::channel(());
        assert_eq!(interruptible(async { "line" }, &mut rx).await, Some("line"));

        tx.send(()).unwrap();
        let work = std::future::pending::<()>();
        assert_eq!(interruptible(work, &mut rx).await, None);
    }

    #[test]
    fn test_history_keeps_last_ten() {
        let mut history = Vec::new();
        for i in 0..13 {
            remember(&mut history, ChatExchange::new(format!("q{i}"), "a"));
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].user, "q3");
        assert_eq!(history[9].user, "q12");
    }
}
