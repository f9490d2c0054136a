//! End-to-end behaviour of the coordinator catalog against the in-memory KV store.

use std::sync::Arc;

use seglake_core::{
    Binlog, CheckPoint, CollectionId, CompactionResult, CompactionSegmentBinlogs, CoreError,
    DataCoordConfig, FieldBinlog, FieldId, MsgPosition, NoopMetrics, PartitionId, PlanId,
    SegmentId, SegmentInfo, SegmentState, TxnKv,
};
use seglake_datacoord::{SegmentEntry, SegmentMeta, UpdateFlushSegmentsRequest};
use seglake_metadata::{CompactionTxnState, KvSegmentCatalog};
use seglake_storage::{MemoryTxnKv, MockFailure};
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(max_txn_ops: usize) -> DataCoordConfig {
    DataCoordConfig {
        max_txn_ops,
        ..DataCoordConfig::default()
    }
}

async fn open(kv: Arc<MemoryTxnKv>, config: &DataCoordConfig) -> SegmentMeta {
    SegmentMeta::new(kv, config, Arc::new(NoopMetrics), CancellationToken::new())
        .await
        .unwrap()
}

fn segment(id: i64, channel: &str, state: SegmentState, rows: i64) -> SegmentInfo {
    let mut info = SegmentInfo::growing(
        SegmentId::new(id),
        CollectionId::new(100),
        PartitionId::new(1),
        channel,
        false,
    );
    info.state = state;
    info.num_of_rows = rows;
    info
}

fn logs(field: i64, paths: &[&str]) -> Vec<FieldBinlog> {
    vec![FieldBinlog::new(
        FieldId::new(field),
        paths.iter().map(|p| Binlog::with_path(*p, 10)).collect(),
    )]
}

fn checkpoint(id: i64, ts: u64, rows: i64) -> CheckPoint {
    CheckPoint {
        segment_id: SegmentId::new(id),
        position: MsgPosition::new("ch-1", vec![1, 2, 3], ts),
        num_of_rows: rows,
    }
}

#[tokio::test]
async fn test_flush_report_is_applied_atomically() {
    init_tracing();
    let kv = Arc::new(MemoryTxnKv::new());
    let meta = open(kv.clone(), &DataCoordConfig::default()).await;
    meta.add_segment(segment(1, "ch-1", SegmentState::Growing, 0))
        .await
        .unwrap();
    meta.add_segment(segment(2, "ch-1", SegmentState::Growing, 0))
        .await
        .unwrap();
    kv.clear_history();

    let mut req = UpdateFlushSegmentsRequest::new(SegmentId::new(1));
    req.flushed = true;
    req.binlogs = logs(101, &["ins/1/101/1"]);
    req.statslogs = logs(100, &["stats/1/100/1"]);
    req.checkpoints = vec![checkpoint(1, 50, 3), checkpoint(2, 60, 8)];
    meta.update_flush_segments_info(req).await.unwrap();

    let history = kv.get_call_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].operation, "multi_save");
    assert_eq!(history[0].keys.len(), 2);

    let first = meta.get_segment(SegmentId::new(1)).await.unwrap();
    assert_eq!(first.state(), SegmentState::Flushing);
    assert_eq!(first.info.num_of_rows, 3);
    assert_eq!(first.info.binlogs, logs(101, &["ins/1/101/1"]));
    assert_eq!(first.info.statslogs, logs(100, &["stats/1/100/1"]));

    let second = meta.get_segment(SegmentId::new(2)).await.unwrap();
    assert_eq!(second.state(), SegmentState::Growing);
    assert_eq!(second.info.num_of_rows, 8);
    assert_eq!(second.info.dml_position.as_ref().unwrap().timestamp, 60);
}

#[tokio::test]
async fn test_stale_checkpoint_is_ignored() {
    let kv = Arc::new(MemoryTxnKv::new());
    let meta = open(kv, &DataCoordConfig::default()).await;
    meta.add_segment(segment(1, "ch-1", SegmentState::Growing, 0))
        .await
        .unwrap();

    let mut req = UpdateFlushSegmentsRequest::new(SegmentId::new(1));
    req.checkpoints = vec![checkpoint(1, 100, 10)];
    meta.update_flush_segments_info(req).await.unwrap();

    for ts in [100, 90] {
        let mut stale = UpdateFlushSegmentsRequest::new(SegmentId::new(1));
        stale.checkpoints = vec![checkpoint(1, ts, 99)];
        meta.update_flush_segments_info(stale).await.unwrap();
    }

    let seg = meta.get_segment(SegmentId::new(1)).await.unwrap();
    assert_eq!(seg.info.num_of_rows, 10);
    assert_eq!(seg.info.dml_position.as_ref().unwrap().timestamp, 100);
}

#[tokio::test]
async fn test_binlogs_merge_without_duplicates() {
    let kv = Arc::new(MemoryTxnKv::new());
    let meta = open(kv, &DataCoordConfig::default()).await;
    meta.add_segment(segment(1, "ch-1", SegmentState::Growing, 0))
        .await
        .unwrap();

    for paths in [&["a", "b"][..], &["b", "c"][..]] {
        let mut req = UpdateFlushSegmentsRequest::new(SegmentId::new(1));
        req.binlogs = logs(101, paths);
        req.deltalogs = logs(0, paths);
        meta.update_flush_segments_info(req).await.unwrap();
    }

    let seg = meta.get_segment(SegmentId::new(1)).await.unwrap();
    assert_eq!(seg.info.binlogs, logs(101, &["a", "b", "c"]));
    assert_eq!(seg.info.deltalogs, logs(0, &["a", "b", "c"]));
}

#[tokio::test]
async fn test_persistence_failure_leaves_memory_untouched() {
    let kv = Arc::new(MemoryTxnKv::new());
    let meta = open(kv.clone(), &DataCoordConfig::default()).await;
    meta.add_segment(segment(1, "ch-1", SegmentState::Growing, 0))
        .await
        .unwrap();
    let before = meta.get_segment(SegmentId::new(1)).await.unwrap();

    kv.inject(MockFailure::Permanent("txn rejected"));
    let mut req = UpdateFlushSegmentsRequest::new(SegmentId::new(1));
    req.flushed = true;
    req.checkpoints = vec![checkpoint(1, 10, 5)];
    let err = meta.update_flush_segments_info(req).await.unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));

    kv.inject(MockFailure::Transient("leader changed"));
    assert!(meta
        .set_state(SegmentId::new(1), SegmentState::Sealed)
        .await
        .is_err());

    kv.inject(MockFailure::Permanent("txn rejected"));
    assert!(meta
        .add_segment(segment(2, "ch-1", SegmentState::Growing, 0))
        .await
        .is_err());

    let after = meta.get_segment(SegmentId::new(1)).await.unwrap();
    assert_eq!(*before, *after);
    assert!(meta.get_segment_unsafe(SegmentId::new(2)).await.is_none());
}

#[tokio::test]
async fn test_cancelled_meta_rejects_mutations() {
    let kv = Arc::new(MemoryTxnKv::new());
    let cancel = CancellationToken::new();
    let meta = SegmentMeta::new(
        kv.clone(),
        &DataCoordConfig::default(),
        Arc::new(NoopMetrics),
        cancel.clone(),
    )
    .await
    .unwrap();

    cancel.cancel();
    let err = meta
        .add_segment(segment(1, "ch-1", SegmentState::Growing, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert!(kv.is_empty());
    assert!(meta.get_all_segments_unsafe().await.is_empty());
}

#[tokio::test]
async fn test_drop_channel_batches_with_marker_last() {
    init_tracing();
    let kv = Arc::new(MemoryTxnKv::with_max_txn_ops(4));
    let config = config(4);
    let meta = open(kv.clone(), &config).await;

    for id in 1..=6 {
        meta.add_segment(segment(id, "ch-drop", SegmentState::Growing, id))
            .await
            .unwrap();
    }
    meta.add_segment(segment(7, "ch-drop", SegmentState::Flushed, 7))
        .await
        .unwrap();
    meta.add_segment(segment(8, "ch-keep", SegmentState::Growing, 0))
        .await
        .unwrap();
    kv.clear_history();

    let mut reported = SegmentEntry::new(segment(1, "ch-drop", SegmentState::Growing, 1))
        .with_current_rows(11);
    reported.info.binlogs = logs(101, &["ins/1/101/9"]);
    reported.info.dml_position = Some(MsgPosition::new("ch-drop", vec![4], 400));
    let unknown = SegmentEntry::new(segment(99, "ch-drop", SegmentState::Growing, 0));

    meta.update_drop_channel_segment_info("ch-drop", vec![reported, unknown])
        .await
        .unwrap();

    let history = kv.get_call_history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|c| c.success && c.keys.len() == 4));
    let marker = KvSegmentCatalog::new(kv.clone(), &config).channel_removal_key("ch-drop");
    assert_eq!(history[1].keys.last(), Some(&marker));
    assert!(!history[0].keys.contains(&marker));

    assert!(meta.is_channel_dropped("ch-drop").await.unwrap());
    assert!(!meta.is_channel_dropped("ch-keep").await.unwrap());
    assert!(meta.get_segments_by_channel("ch-drop").await.is_empty());
    assert_eq!(meta.get_segments_by_channel("ch-keep").await.len(), 1);

    let merged = meta.get_segment_unsafe(SegmentId::new(1)).await.unwrap();
    assert_eq!(merged.state(), SegmentState::Dropped);
    assert!(merged.info.dropped_at > 0);
    assert_eq!(merged.current_rows, 11);
    assert_eq!(merged.info.binlogs, logs(101, &["ins/1/101/9"]));
    assert_eq!(merged.info.dml_position.as_ref().unwrap().timestamp, 400);
    assert!(meta.get_segment_unsafe(SegmentId::new(99)).await.is_none());
}

#[tokio::test]
async fn test_repeated_drop_channel_is_noop() {
    let kv = Arc::new(MemoryTxnKv::new());
    let config = DataCoordConfig::default();
    let meta = open(kv.clone(), &config).await;
    for id in 1..=3 {
        meta.add_segment(segment(id, "ch-d", SegmentState::Growing, id))
            .await
            .unwrap();
    }

    meta.update_drop_channel_segment_info("ch-d", Vec::new())
        .await
        .unwrap();
    let first: Vec<_> = meta.get_all_segments_unsafe().await;
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|s| s.state() == SegmentState::Dropped));
    kv.clear_history();

    meta.update_drop_channel_segment_info("ch-d", Vec::new())
        .await
        .unwrap();

    let marker = KvSegmentCatalog::new(kv.clone(), &config).channel_removal_key("ch-d");
    let written: Vec<String> = kv
        .get_call_history()
        .into_iter()
        .flat_map(|c| c.keys)
        .collect();
    assert_eq!(written, vec![marker]);

    let second = meta.get_all_segments_unsafe().await;
    assert_eq!(first.len(), second.len());
    for (before, after) in first.iter().zip(&second) {
        assert_eq!(**before, **after);
    }
    assert!(meta.get_segments_by_channel("ch-d").await.is_empty());
    assert!(meta.is_channel_dropped("ch-d").await.unwrap());
}

fn compaction_inputs() -> (Vec<CompactionSegmentBinlogs>, CompactionResult) {
    let logs_of = |id: i64| CompactionSegmentBinlogs {
        segment_id: SegmentId::new(id),
        field_binlogs: logs(101, &[&format!("ins/{id}")]),
        insert_channel: "ch-1".to_string(),
        ..Default::default()
    };
    let result = CompactionResult {
        plan_id: PlanId::new(9),
        segment_id: SegmentId::new(30),
        num_of_rows: 25,
        insert_logs: logs(101, &["ins/30"]),
        channel: "ch-1".to_string(),
        ..Default::default()
    };
    (vec![logs_of(10), logs_of(20)], result)
}

async fn compaction_fixture(kv: Arc<MemoryTxnKv>) -> SegmentMeta {
    let meta = open(kv, &DataCoordConfig::default()).await;
    meta.add_segment(segment(10, "ch-1", SegmentState::Flushed, 10))
        .await
        .unwrap();
    meta.add_segment(segment(20, "ch-1", SegmentState::Flushed, 15))
        .await
        .unwrap();
    meta
}

#[tokio::test]
async fn test_compaction_commit() {
    init_tracing();
    let kv = Arc::new(MemoryTxnKv::new());
    let meta = compaction_fixture(kv.clone()).await;
    let (source_logs, result) = compaction_inputs();

    let outcome = meta
        .complete_compaction(&source_logs, &result, |_| async { Ok::<(), CoreError>(()) })
        .await
        .unwrap();
    assert_eq!(outcome.new_segment.id(), SegmentId::new(30));

    let new = meta.get_segment(SegmentId::new(30)).await.unwrap();
    assert_eq!(new.state(), SegmentState::Flushing);
    assert_eq!(new.info.compaction_from, vec![SegmentId::new(10), SegmentId::new(20)]);
    for id in [10, 20] {
        let src = meta.get_segment_unsafe(SegmentId::new(id)).await.unwrap();
        assert_eq!(src.state(), SegmentState::Dropped);
        assert_eq!(src.info.compacted_to, Some(SegmentId::new(30)));
    }

    let catalog = KvSegmentCatalog::new(kv.clone(), &DataCoordConfig::default());
    assert_eq!(
        catalog.compaction_txn_state(SegmentId::new(30)).await.unwrap(),
        Some(CompactionTxnState::Committed)
    );

    // A dropped source can no longer be compacted.
    let err = meta
        .get_complete_compaction_meta(&source_logs, &result)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidCompactionSource(ids) if ids.len() == 2));
}

#[tokio::test]
async fn test_compaction_rejects_unflushed_sources() {
    for state in [
        SegmentState::Growing,
        SegmentState::Sealed,
        SegmentState::Flushing,
    ] {
        let kv = Arc::new(MemoryTxnKv::new());
        let meta = open(kv.clone(), &DataCoordConfig::default()).await;
        meta.add_segment(segment(10, "ch-1", state, 10))
            .await
            .unwrap();
        meta.add_segment(segment(20, "ch-1", SegmentState::Flushed, 15))
            .await
            .unwrap();
        kv.clear_history();
        let (source_logs, result) = compaction_inputs();

        let err = meta
            .complete_compaction(&source_logs, &result, |_| async {
                Err::<(), _>(CoreError::internal("must not be acknowledged"))
            })
            .await
            .unwrap_err();
        assert!(
            matches!(&err, CoreError::InvalidCompactionSource(ids) if *ids == vec![SegmentId::new(10)]),
            "unexpected error for {state}: {err}"
        );

        assert!(kv.get_call_history().is_empty());
        assert_eq!(
            meta.get_segment(SegmentId::new(10)).await.unwrap().state(),
            state
        );
        assert_eq!(
            meta.get_segment(SegmentId::new(20)).await.unwrap().state(),
            SegmentState::Flushed
        );
        assert!(meta.get_segment_unsafe(SegmentId::new(30)).await.is_none());
    }
}

#[tokio::test]
async fn test_compaction_reverts_when_not_acknowledged() {
    let kv = Arc::new(MemoryTxnKv::new());
    let meta = compaction_fixture(kv.clone()).await;
    let (source_logs, result) = compaction_inputs();

    let err = meta
        .complete_compaction(&source_logs, &result, |_| async {
            Err::<(), _>(CoreError::internal("data node unreachable"))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Internal { .. }));

    assert!(meta.get_segment_unsafe(SegmentId::new(30)).await.is_none());
    for id in [10, 20] {
        let src = meta.get_segment(SegmentId::new(id)).await.unwrap();
        assert_eq!(src.state(), SegmentState::Flushed);
    }

    let catalog = KvSegmentCatalog::new(kv.clone(), &DataCoordConfig::default());
    assert_eq!(
        catalog.compaction_txn_state(SegmentId::new(30)).await.unwrap(),
        Some(CompactionTxnState::Reverted)
    );
    let stored = catalog.list_segments().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|s| s.state == SegmentState::Flushed));

    let meta_view = meta.get_complete_compaction_meta(&source_logs, &result).await.unwrap();
    let err = meta
        .alter_meta_store_after_compaction(&meta_view.modified_sources, &meta_view.new_segment)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));
}

#[tokio::test]
async fn test_empty_compaction_result_is_not_published() {
    let kv = Arc::new(MemoryTxnKv::new());
    let meta = compaction_fixture(kv.clone()).await;
    let (source_logs, mut result) = compaction_inputs();
    result.num_of_rows = 0;

    meta.complete_compaction(&source_logs, &result, |_| async { Ok::<(), CoreError>(()) })
        .await
        .unwrap();

    assert!(meta.get_segment_unsafe(SegmentId::new(30)).await.is_none());
    assert!(meta.get_segment(SegmentId::new(10)).await.is_none());
    assert!(kv
        .keys_with_prefix("datacoord-meta/s/")
        .iter()
        .all(|k| !k.ends_with("/30")));
}

#[tokio::test]
async fn test_reload_restores_persisted_view() {
    let kv = Arc::new(MemoryTxnKv::new());
    {
        let meta = open(kv.clone(), &DataCoordConfig::default()).await;
        meta.add_segment(segment(1, "ch-1", SegmentState::Growing, 0))
            .await
            .unwrap();
        meta.add_segment(segment(2, "ch-1", SegmentState::Flushed, 20))
            .await
            .unwrap();
        meta.set_current_rows(SegmentId::new(1), 5).await;
        meta.drop_segment(SegmentId::new(2)).await.unwrap();
    }

    kv.save("unrelated/key", bytes_of("x")).await.unwrap();
    let reloaded = open(kv, &DataCoordConfig::default()).await;
    let all = reloaded.get_all_segments_unsafe().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id(), SegmentId::new(1));
    assert_eq!(all[0].current_rows, 0);
    assert!(reloaded
        .has_segments(&[SegmentId::new(1)])
        .await
        .unwrap());
}

fn bytes_of(s: &'static str) -> bytes::Bytes {
    bytes::Bytes::from_static(s.as_bytes())
}
