//! On-disk contract tests for the JSONL result store.

use std::sync::Arc;

use rollout_store::fakes::MemoryResultStore;
use rollout_store::{JsonlResultStore, ResultStore, RolloutRecord};
use serde_json::json;

fn completed(id: &str, idx: u32, terminated: bool) -> RolloutRecord {
    RolloutRecord::completed(
        id,
        idx,
        vec![json!({"role": "user", "content": "list tables"})],
        vec![json!({"role": "user", "content": "list tables"})],
        terminated,
    )
}

#[tokio::test]
async fn missing_file_loads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlResultStore::open(dir.path().join("out")).await.unwrap();

    assert!(store.load_all().await.unwrap().is_empty());
    assert!(store.load_ledger().await.unwrap().is_empty());
}

#[tokio::test]
async fn appended_records_round_trip_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlResultStore::open(dir.path()).await.unwrap();

    store.append(&completed("t1", 0, true)).await.unwrap();
    store
        .append(&RolloutRecord::failed("t2", 0, "ERROR: gone", Some(3)))
        .await
        .unwrap();

    let records = store.load_all().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].instance_id, "t1");
    assert!(records[0].terminated());
    assert_eq!(records[1].error(), Some("ERROR: gone"));

    let ledger = store.load_ledger().await.unwrap();
    assert_eq!(ledger.completed("t1"), 1);
    assert_eq!(ledger.completed("t2"), 0);
}

#[tokio::test]
async fn corrupt_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlResultStore::open(dir.path()).await.unwrap();
    store.append(&completed("good", 0, false)).await.unwrap();

    let mut raw = tokio::fs::read_to_string(store.path()).await.unwrap();
    raw.push_str("{not json\n\n");
    tokio::fs::write(store.path(), raw).await.unwrap();
    store.append(&completed("good", 1, true)).await.unwrap();

    let records = store.load_all().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(store.load_ledger().await.unwrap().completed("good"), 2);
}

#[tokio::test]
async fn concurrent_appends_produce_whole_lines() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonlResultStore::open(dir.path()).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..16u32 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.append(&completed("shared", i, true)).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
    assert_eq!(raw.lines().count(), 16);
    assert_eq!(store.load_ledger().await.unwrap().completed("shared"), 16);
}

#[tokio::test]
async fn memory_store_satisfies_same_contract() {
    let store = MemoryResultStore::with_records(vec![completed("seed", 0, true)]);
    store
        .append(&RolloutRecord::failed("seed", 1, "boom", None))
        .await
        .unwrap();

    assert_eq!(store.records().len(), 2);
    assert_eq!(store.load_ledger().await.unwrap().completed("seed"), 1);
}
