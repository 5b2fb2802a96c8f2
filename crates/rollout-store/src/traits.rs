//! Storage trait for rollout results.
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::ledger::CompletionLedger;
use crate::record::RolloutRecord;

/// Append-only result store.
///
/// Guarantees:
/// - Each `append` is one logical write; concurrent appends never interleave.
/// - `load_all` returns records in append order.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist one finished unit.
    async fn append(&self, record: &RolloutRecord) -> StoreResult<()>;

    /// Load every record written so far.
    async fn load_all(&self) -> StoreResult<Vec<RolloutRecord>>;

    /// Derive the completion ledger from the stored records.
    async fn load_ledger(&self) -> StoreResult<CompletionLedger> {
        let records = self.load_all().await?;
        Ok(CompletionLedger::from_records(&records))
    }
}
