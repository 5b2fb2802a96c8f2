//! Completion ledger: how many rollouts per task are already done.

use std::collections::HashMap;

use crate::record::RolloutRecord;

/// Immutable snapshot of completed-rollout counts keyed by task id.
///
/// Only success-path records count. A failed unit leaves its slot open so
/// the next pass retries it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionLedger {
    counts: HashMap<String, u32>,
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count completed records per task.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a RolloutRecord>) -> Self {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for record in records.into_iter().filter(|r| r.is_completed()) {
            *counts.entry(record.instance_id.clone()).or_default() += 1;
        }
        Self { counts }
    }

    /// Completed rollouts for `task_id` (0 when unknown).
    pub fn completed(&self, task_id: &str) -> u32 {
        self.counts.get(task_id).copied().unwrap_or(0)
    }

    /// Sum of completed rollouts across all tasks.
    pub fn total(&self) -> u64 {
        self.counts.values().map(|c| u64::from(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u32)> for CompletionLedger {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_records_are_counted() {
        let records = vec![
            RolloutRecord::completed("t1", 0, vec![], vec![], true),
            RolloutRecord::completed("t1", 1, vec![], vec![], false),
            RolloutRecord::failed("t1", 2, "boom", None),
            RolloutRecord::failed("t2", 0, "boom", Some(1)),
            RolloutRecord::completed("t3", 0, vec![], vec![], true),
        ];
        let ledger = CompletionLedger::from_records(&records);

        assert_eq!(ledger.completed("t1"), 2);
        assert_eq!(ledger.completed("t2"), 0);
        assert_eq!(ledger.completed("t3"), 1);
        assert_eq!(ledger.completed("missing"), 0);
        assert_eq!(ledger.total(), 3);
    }

    #[test]
    fn ledger_from_pairs() {
        let ledger: CompletionLedger = vec![("a".to_string(), 2), ("b".to_string(), 0)]
            .into_iter()
            .collect();
        assert_eq!(ledger.completed("a"), 2);
        assert_eq!(ledger.total(), 2);
        assert!(!ledger.is_empty());
    }
}
