//! Rollout-Store: result persistence for rollout-agent
//!
//! This crate owns everything that outlives a single scheduling pass: the
//! write-once record produced for each finished `(task, rollout)` unit, and
//! the completion ledger derived from those records on resume.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: one logical append per finished unit, tolerant reads.
//!
//! ## Key Components
//!
//! - `RolloutRecord`: the persisted outcome of one rollout
//! - `CompletionLedger`: per-task count of completed rollouts
//! - `ResultStore`: async storage trait (`JsonlResultStore`, `fakes::MemoryResultStore`)

mod error;
pub mod fakes;
pub mod jsonl;
pub mod ledger;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use jsonl::JsonlResultStore;
pub use ledger::CompletionLedger;
pub use record::{RecordOutcome, RolloutRecord};
pub use traits::ResultStore;
