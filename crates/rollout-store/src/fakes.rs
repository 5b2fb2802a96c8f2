//! In-memory fakes for the storage trait (testing only)
//!
//! Provides `MemoryResultStore`, which satisfies the `ResultStore` contract
//! without touching the filesystem.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::record::RolloutRecord;
use crate::traits::ResultStore;

/// In-memory result store backed by a `Vec<RolloutRecord>`.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: Mutex<Vec<RolloutRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with previously persisted records.
    pub fn with_records(records: Vec<RolloutRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<RolloutRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn append(&self, record: &RolloutRecord) -> StoreResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn load_all(&self) -> StoreResult<Vec<RolloutRecord>> {
        Ok(self.records())
    }
}
