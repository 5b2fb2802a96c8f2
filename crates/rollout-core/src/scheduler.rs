//! Fan-out of `(task, rollout_idx)` units over a bounded worker pool.
//!
//! A pass works from an immutable [`CompletionLedger`] snapshot: each task
//! gets the units `[completed, quota)`. The only state shared between
//! workers is the [`CompletionCounter`], which each unit must claim a slot
//! from right before it runs, and the result store's append path.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rollout_store::{CompletionLedger, RecordOutcome, ResultStore, RolloutRecord};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::config::RolloutConfig;
use crate::domain::Task;
use crate::metrics::METRICS;
use crate::obs;

/// Live per-task completion counts for one pass.
///
/// Seeded from the ledger snapshot. Keys are fixed at construction; only
/// the counts move, and only through atomic compare-and-increment.
#[derive(Debug, Default)]
pub struct CompletionCounter {
    counts: HashMap<String, AtomicU32>,
}

impl CompletionCounter {
    pub fn seeded<'a>(
        task_ids: impl IntoIterator<Item = &'a str>,
        ledger: &CompletionLedger,
    ) -> Self {
        let counts = task_ids
            .into_iter()
            .map(|id| (id.to_string(), AtomicU32::new(ledger.completed(id))))
            .collect();
        Self { counts }
    }

    /// Take one slot for `task_id` if fewer than `quota` are taken.
    pub fn try_claim(&self, task_id: &str, quota: u32) -> bool {
        let Some(count) = self.counts.get(task_id) else {
            return false;
        };
        count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < quota).then_some(n + 1)
            })
            .is_ok()
    }

    /// Give back a slot whose unit did not complete.
    pub fn release(&self, task_id: &str) {
        if let Some(count) = self.counts.get(task_id) {
            let _ = count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
    }

    pub fn get(&self, task_id: &str) -> u32 {
        self.counts
            .get(task_id)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

/// Expand tasks into units, skipping indices the ledger already covers.
///
/// A task id listed more than once contributes its units once (first
/// occurrence wins), so every `(instance_id, rollout_idx)` is planned at
/// most once per pass. Order follows `tasks`.
pub fn plan_units(
    tasks: &[Arc<Task>],
    ledger: &CompletionLedger,
    quota: u32,
) -> Vec<(Arc<Task>, u32)> {
    let mut seen = HashSet::new();
    tasks
        .iter()
        .filter(|task| {
            let first = seen.insert(task.instance_id.clone());
            if !first {
                debug!(instance_id = %task.instance_id, "duplicate task ignored");
            }
            first
        })
        .flat_map(|task| {
            let start = ledger.completed(&task.instance_id);
            (start..quota).map(move |idx| (Arc::clone(task), idx))
        })
        .collect()
}

/// Aggregate counts of one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub total_tasks: usize,
    pub planned: usize,
    pub dispatched: usize,
    /// Units whose task reached quota before they could run.
    pub skipped: usize,
    /// Units never started because shutdown was requested.
    pub cancelled: usize,
    pub terminated: usize,
    pub incomplete: usize,
    pub failed: usize,
    /// Finished units whose record could not be written.
    pub persist_errors: usize,
}

enum UnitStatus {
    Skipped,
    Cancelled,
    Finished { record: RolloutRecord, persisted: bool },
}

/// Runs a pass of rollouts.
#[derive(Debug, Clone)]
pub struct RolloutScheduler {
    config: RolloutConfig,
    shutdown: Option<watch::Receiver<bool>>,
    seed: Option<u64>,
}

impl RolloutScheduler {
    pub fn new(config: RolloutConfig) -> Self {
        Self {
            config,
            shutdown: None,
            seed: None,
        }
    }

    /// Stop starting new units once `true` is sent. Units already running
    /// finish normally.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Make the task shuffle reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Run every outstanding unit and persist one record per finished unit.
    ///
    /// `unit` is the per-rollout pipeline; it must always yield a record.
    /// A panic inside it is caught and recorded as a failure of that unit
    /// only.
    #[instrument(skip_all, fields(pass_id = %uuid::Uuid::new_v4(), tasks = tasks.len()))]
    pub async fn run<F, Fut>(
        &self,
        mut tasks: Vec<Task>,
        ledger: &CompletionLedger,
        store: Arc<dyn ResultStore>,
        unit: F,
    ) -> SchedulerReport
    where
        F: Fn(Arc<Task>, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RolloutRecord> + Send + 'static,
    {
        match self.seed {
            Some(seed) => tasks.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => tasks.shuffle(&mut rand::thread_rng()),
        }
        let tasks: Vec<Arc<Task>> = tasks.into_iter().map(Arc::new).collect();
        let quota = self.config.rollout_quota;
        let units = plan_units(&tasks, ledger, quota);
        let workers = self.config.num_workers.max(1);

        let mut report = SchedulerReport {
            total_tasks: tasks.len(),
            planned: units.len(),
            ..SchedulerReport::default()
        };
        obs::emit_scheduling_plan(tasks.len(), units.len(), workers);

        let counter = Arc::new(CompletionCounter::seeded(
            tasks.iter().map(|t| t.instance_id.as_str()),
            ledger,
        ));
        let unit = Arc::new(unit);
        let sem = Arc::new(Semaphore::new(workers));
        let mut pending = FuturesUnordered::new();

        for (task, idx) in units {
            let counter = Arc::clone(&counter);
            let unit = Arc::clone(&unit);
            let store = Arc::clone(&store);
            let sem = Arc::clone(&sem);
            let shutdown = self.shutdown.clone();

            pending.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();

                if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                    return UnitStatus::Cancelled;
                }
                // Re-check right before running: duplicate input tasks share
                // the same counter.
                if !counter.try_claim(&task.instance_id, quota) {
                    obs::emit_unit_skipped(&task.instance_id, idx);
                    METRICS.inc_units_skipped();
                    return UnitStatus::Skipped;
                }
                METRICS.inc_units_dispatched();

                let record = match tokio::spawn(unit(Arc::clone(&task), idx)).await {
                    Ok(record) => record,
                    Err(e) => {
                        obs::emit_unit_failed(&task.instance_id, idx, &e);
                        RolloutRecord::failed(
                            task.instance_id.clone(),
                            idx,
                            format!("unit aborted: {e}"),
                            None,
                        )
                    }
                };
                if !record.is_completed() {
                    counter.release(&task.instance_id);
                }

                let persisted = match store.append(&record).await {
                    Ok(()) => true,
                    Err(e) => {
                        obs::emit_persist_failed(&task.instance_id, idx, &e);
                        false
                    }
                };
                UnitStatus::Finished { record, persisted }
            }));
        }

        while let Some(joined) = pending.next().await {
            match joined {
                Ok(UnitStatus::Skipped) => report.skipped += 1,
                Ok(UnitStatus::Cancelled) => report.cancelled += 1,
                Ok(UnitStatus::Finished { record, persisted }) => {
                    report.dispatched += 1;
                    match &record.outcome {
                        RecordOutcome::Completed { terminated: true, .. } => {
                            report.terminated += 1
                        }
                        RecordOutcome::Completed { .. } => report.incomplete += 1,
                        RecordOutcome::Failed { .. } => report.failed += 1,
                    }
                    if !persisted {
                        report.persist_errors += 1;
                    }
                    info!(
                        instance_id = %record.instance_id,
                        rollout_idx = record.rollout_idx,
                        done = report.dispatched,
                        planned = report.planned,
                        "unit finished"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "scheduler worker aborted");
                    report.failed += 1;
                }
            }
        }

        METRICS.flush();
        info!(
            dispatched = report.dispatched,
            skipped = report.skipped,
            cancelled = report.cancelled,
            terminated = report.terminated,
            incomplete = report.incomplete,
            failed = report.failed,
            "scheduling pass finished"
        );
        report
    }
}
