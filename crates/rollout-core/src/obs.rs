//! Structured observability hooks for the rollout lifecycle.
//!
//! This module provides:
//! - Rollout-scoped tracing spans via [`rollout_span`]
//! - Emission functions for key lifecycle events: scheduling, rollout
//!   start/finish, rounds, tool dispatch and model retries
//!
//! Events are emitted at `info!` level unless noted. Verbosity follows
//! `RUST_LOG`; JSON output is selected with `--json`.

use std::fmt::Display;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn, Span};

/// Span covering one `(task, rollout)` unit.
///
/// Attach it with `tracing::Instrument` so it survives await points:
///
/// ```ignore
/// run_rollout(task).instrument(obs::rollout_span("t1", 0)).await;
/// // every event inside carries instance_id = "t1", rollout_idx = 0
/// ```
pub fn rollout_span(instance_id: &str, rollout_idx: u32) -> Span {
    tracing::info_span!("rollout", instance_id = %instance_id, rollout_idx)
}

/// Emit event: scheduling pass planned.
pub fn emit_scheduling_plan(tasks: usize, planned: usize, workers: usize) {
    info!(event = "scheduler.planned", tasks, planned, workers);
}

/// Emit event: a unit was skipped because its task already reached quota.
pub fn emit_unit_skipped(instance_id: &str, rollout_idx: u32) {
    info!(event = "scheduler.unit_skipped", instance_id = %instance_id, rollout_idx);
}

/// Emit event: a unit faulted outside the rollout pipeline (warning level).
pub fn emit_unit_failed(instance_id: &str, rollout_idx: u32, error: &dyn Display) {
    warn!(event = "scheduler.unit_failed", instance_id = %instance_id, rollout_idx, error = %error);
}

/// Emit event: a finished unit could not be persisted (warning level).
pub fn emit_persist_failed(instance_id: &str, rollout_idx: u32, error: &dyn Display) {
    warn!(event = "scheduler.persist_failed", instance_id = %instance_id, rollout_idx, error = %error);
}

/// Emit event: rollout started.
pub fn emit_rollout_started(instance_id: &str, rollout_idx: u32) {
    info!(event = "rollout.started", instance_id = %instance_id, rollout_idx);
}

/// Emit event: one round finished with the given outcome label.
pub fn emit_round_completed(round: u32, outcome: &str) {
    debug!(event = "rollout.round_completed", round, outcome = %outcome);
}

/// Emit event: rollout finished.
pub fn emit_rollout_finished(
    instance_id: &str,
    rollout_idx: u32,
    rounds: u32,
    status: &str,
    duration_ms: u64,
) {
    info!(
        event = "rollout.finished",
        instance_id = %instance_id,
        rollout_idx,
        rounds,
        status = %status,
        duration_ms,
    );
}

/// Emit event: a tool call is about to be sent to the execution endpoint.
pub fn emit_tool_dispatched(name: &str, arguments: &Map<String, Value>) {
    info!(event = "tool.dispatched", tool = %name, argument_count = arguments.len());
    // Built outside the macro: `debug!` shadows `Value` with `tracing::field::Value`.
    let rendered = Value::Object(arguments.clone()).to_string();
    debug!(event = "tool.arguments", tool = %name, arguments = %rendered);
}

/// Emit event: model call failed and will be retried (warning level).
pub fn emit_model_retry(attempt: u32, max_attempts: u32, wait: Duration, error: &dyn Display) {
    warn!(
        event = "model.retry",
        attempt,
        max_attempts,
        wait_secs = wait.as_secs(),
        error = %error,
    );
}

/// Emit event: model call gave up after the last attempt (warning level).
pub fn emit_model_exhausted(max_attempts: u32, error: &dyn Display) {
    warn!(event = "model.exhausted", max_attempts, error = %error);
}
