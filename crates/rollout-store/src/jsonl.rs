//! Line-delimited JSON result store.
//!
//! Every finished unit becomes one line of `results.jsonl` inside the output
//! folder. Writers are serialized by an async mutex so concurrent workers
//! never interleave partial lines.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::record::RolloutRecord;
use crate::traits::ResultStore;

/// File name used inside the output folder.
pub const RESULTS_FILE_NAME: &str = "results.jsonl";

/// JSONL-backed [`ResultStore`].
#[derive(Debug)]
pub struct JsonlResultStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlResultStore {
    /// Open (creating if needed) the store rooted at `output_folder`.
    pub async fn open(output_folder: impl AsRef<Path>) -> StoreResult<Self> {
        let folder = output_folder.as_ref();
        tokio::fs::create_dir_all(folder)
            .await
            .map_err(|e| StoreError::io(folder, e))?;
        Ok(Self::at_path(folder.join(RESULTS_FILE_NAME)))
    }

    /// Use an explicit results file path. The parent folder must exist.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultStore for JsonlResultStore {
    async fn append(&self, record: &RolloutRecord) -> StoreResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        debug!(
            instance_id = %record.instance_id,
            rollout_idx = record.rollout_idx,
            "result appended"
        );
        Ok(())
    }

    async fn load_all(&self) -> StoreResult<Vec<RolloutRecord>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RolloutRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping unreadable result line"
                ),
            }
        }
        Ok(records)
    }
}
