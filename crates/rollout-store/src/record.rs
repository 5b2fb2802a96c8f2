//! The persisted outcome of one `(task, rollout)` unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One write-once result line.
///
/// Serialized flat: `instance_id`, `rollout_idx`, then either the success
/// fields (`conversation`, `final_messages`, `terminated`) or the failure
/// fields (`error`, `round_failed`, `terminated: false`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutRecord {
    pub instance_id: String,
    pub rollout_idx: u32,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Success or failure payload of a [`RolloutRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordOutcome {
    /// The conversation ran to termination or to the round limit.
    Completed {
        /// Display/audit conversation.
        conversation: Vec<Value>,
        /// Model-facing conversation as last sent.
        #[serde(default)]
        final_messages: Vec<Value>,
        terminated: bool,
    },
    /// The unit failed before producing a conversation.
    Failed {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round_failed: Option<u32>,
        terminated: bool,
    },
}

impl RolloutRecord {
    /// Build a success-path record.
    pub fn completed(
        instance_id: impl Into<String>,
        rollout_idx: u32,
        conversation: Vec<Value>,
        final_messages: Vec<Value>,
        terminated: bool,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            rollout_idx,
            outcome: RecordOutcome::Completed {
                conversation,
                final_messages,
                terminated,
            },
            finished_at: Some(Utc::now()),
        }
    }

    /// Build a failure-path record. Failed records are never terminated.
    pub fn failed(
        instance_id: impl Into<String>,
        rollout_idx: u32,
        error: impl Into<String>,
        round_failed: Option<u32>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            rollout_idx,
            outcome: RecordOutcome::Failed {
                error: error.into(),
                round_failed,
                terminated: false,
            },
            finished_at: Some(Utc::now()),
        }
    }

    /// Whether this record counts toward the completion ledger.
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RecordOutcome::Completed { .. })
    }

    pub fn terminated(&self) -> bool {
        match self.outcome {
            RecordOutcome::Completed { terminated, .. } => terminated,
            RecordOutcome::Failed { .. } => false,
        }
    }

    /// Error text for failure records.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RecordOutcome::Failed { error, .. } => Some(error),
            RecordOutcome::Completed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completed_record_serializes_flat() {
        let record = RolloutRecord::completed(
            "t1",
            0,
            vec![json!({"role": "system", "content": "sys"})],
            vec![],
            true,
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["instance_id"], "t1");
        assert_eq!(value["rollout_idx"], 0);
        assert_eq!(value["terminated"], true);
        assert!(value["conversation"].is_array());
        assert!(value.get("error").is_none());
        assert!(value.get("outcome").is_none());
    }

    #[test]
    fn failed_record_carries_error_and_is_not_terminated() {
        let record = RolloutRecord::failed("t2", 3, "ERROR: backend down", Some(2));
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["error"], "ERROR: backend down");
        assert_eq!(value["round_failed"], 2);
        assert_eq!(value["terminated"], false);
        assert!(value.get("conversation").is_none());
        assert!(!record.is_completed());
        assert_eq!(record.error(), Some("ERROR: backend down"));
    }

    #[test]
    fn legacy_lines_without_timestamp_still_parse() {
        let ok: RolloutRecord = serde_json::from_value(json!({
            "instance_id": "a",
            "rollout_idx": 1,
            "conversation": [],
            "final_messages": [],
            "terminated": false
        }))
        .unwrap();
        assert!(ok.is_completed());
        assert!(!ok.terminated());
        assert!(ok.finished_at.is_none());

        let failed: RolloutRecord = serde_json::from_value(json!({
            "instance_id": "b",
            "rollout_idx": 0,
            "error": "boom",
            "terminated": false
        }))
        .unwrap();
        assert!(!failed.is_completed());
        assert_eq!(failed.error(), Some("boom"));
    }
}
