//! Concurrent access to the in-memory stores.

use std::sync::Arc;

use bytes::Bytes;
use seglake_core::{BlobStore, TxnKv};
use seglake_storage::{MemoryBlobStore, MemoryTxnKv, MockFailure};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_transactions_all_land() {
    let kv = Arc::new(MemoryTxnKv::with_max_txn_ops(8));

    let mut handles = Vec::new();
    for task in 0..16 {
        let kv = Arc::clone(&kv);
        handles.push(tokio::spawn(async move {
            let batch: Vec<_> = (0..4)
                .map(|i| (format!("seg/{task:02}/{i}"), Bytes::from(format!("{task}-{i}"))))
                .collect();
            kv.multi_save(batch).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(kv.len(), 64);
    let task_three = kv.load_with_prefix("seg/03/").await.unwrap();
    assert_eq!(task_three.len(), 4);
    assert_eq!(kv.successful_calls("multi_save"), 16);
}

#[tokio::test]
async fn test_failure_pattern_then_recovery() {
    let kv = MemoryTxnKv::with_failures(vec![
        MockFailure::Transient("leader changed"),
        MockFailure::Ok,
        MockFailure::Permanent("quota exceeded"),
    ]);

    assert!(kv.save("a", Bytes::from("1")).await.is_err());
    kv.save("a", Bytes::from("1")).await.unwrap();
    assert!(kv.remove("a").await.is_err());
    assert_eq!(kv.get("a"), Some(Bytes::from("1")));

    kv.remove("a").await.unwrap();
    assert!(kv.get("a").is_none());
}

#[tokio::test]
async fn test_blob_round_trip_across_tasks() {
    let store = Arc::new(MemoryBlobStore::new());
    let writer = Arc::clone(&store);
    tokio::spawn(async move {
        writer
            .write("stats/1/100/0", Bytes::from_static(b"{}"))
            .await
            .unwrap();
    })
    .await
    .unwrap();

    let blobs = store
        .multi_read(&["stats/1/100/0".to_string()])
        .await
        .unwrap();
    assert_eq!(blobs[0].as_ref(), b"{}");
}
