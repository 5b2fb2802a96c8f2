//! Global atomic counters for rollout observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event; the scheduler does so after each pass.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters. No allocations, no locking.
pub struct Metrics {
    units_dispatched: AtomicU64,
    units_skipped: AtomicU64,
    rollouts_terminated: AtomicU64,
    rollouts_incomplete: AtomicU64,
    rollouts_failed: AtomicU64,
    model_failures: AtomicU64,
    tool_calls: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64, metric: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric, "counter incremented");
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            units_dispatched: AtomicU64::new(0),
            units_skipped: AtomicU64::new(0),
            rollouts_terminated: AtomicU64::new(0),
            rollouts_incomplete: AtomicU64::new(0),
            rollouts_failed: AtomicU64::new(0),
            model_failures: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
        }
    }

    pub fn inc_units_dispatched(&self) {
        bump(&self.units_dispatched, "units_dispatched");
    }

    pub fn inc_units_skipped(&self) {
        bump(&self.units_skipped, "units_skipped");
    }

    pub fn inc_rollouts_terminated(&self) {
        bump(&self.rollouts_terminated, "rollouts_terminated");
    }

    pub fn inc_rollouts_incomplete(&self) {
        bump(&self.rollouts_incomplete, "rollouts_incomplete");
    }

    pub fn inc_rollouts_failed(&self) {
        bump(&self.rollouts_failed, "rollouts_failed");
    }

    /// One failed model attempt, whether or not it is retried.
    pub fn inc_model_failures(&self) {
        bump(&self.model_failures, "model_failures");
    }

    pub fn inc_tool_calls(&self) {
        bump(&self.tool_calls, "tool_calls");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            units_dispatched = self.units_dispatched(),
            units_skipped = self.units_skipped(),
            rollouts_terminated = self.rollouts_terminated(),
            rollouts_incomplete = self.rollouts_incomplete(),
            rollouts_failed = self.rollouts_failed(),
            model_failures = self.model_failures(),
            tool_calls = self.tool_calls(),
        );
    }

    pub fn units_dispatched(&self) -> u64 {
        self.units_dispatched.load(Ordering::Relaxed)
    }

    pub fn units_skipped(&self) -> u64 {
        self.units_skipped.load(Ordering::Relaxed)
    }

    pub fn rollouts_terminated(&self) -> u64 {
        self.rollouts_terminated.load(Ordering::Relaxed)
    }

    pub fn rollouts_incomplete(&self) -> u64 {
        self.rollouts_incomplete.load(Ordering::Relaxed)
    }

    pub fn rollouts_failed(&self) -> u64 {
        self.rollouts_failed.load(Ordering::Relaxed)
    }

    pub fn model_failures(&self) -> u64 {
        self.model_failures.load(Ordering::Relaxed)
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.units_dispatched,
            &self.units_skipped,
            &self.rollouts_terminated,
            &self.rollouts_incomplete,
            &self.rollouts_failed,
            &self.model_failures,
            &self.tool_calls,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
