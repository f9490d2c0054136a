//! Authoritative segment catalog of the coordinator.
//!
//! Mutations follow one pattern: take the write lock, build the new version of
//! every touched entry from a clone, persist the batch, then publish the clones.
//! The KV write is the only suspension point while the lock is held, so a failed
//! or cancelled write leaves memory exactly as it was.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use seglake_core::binlog::merge_field_binlogs;
use seglake_core::{
    with_cancellation, CheckPoint, CollectionId, CompactionResult, CompactionSegmentBinlogs,
    CoreError, CoreResult, DataCoordConfig, FieldBinlog, MetricsSink, PartitionId, SegmentId,
    SegmentInfo, SegmentStartPosition, SegmentState, TxnKv,
};
use seglake_metadata::KvSegmentCatalog;

use crate::collection::CollectionInfo;
use crate::compaction::{build_compaction_meta, CompactionMeta};
use crate::segments_info::{Allocation, SegmentEntry, SegmentsInfo};

/// Flush report from a data node for one segment.
#[derive(Debug, Clone, Default)]
pub struct UpdateFlushSegmentsRequest {
    pub segment_id: SegmentId,
    /// The segment is completely flushed and moves to `Flushing`.
    pub flushed: bool,
    /// The segment is dropped.
    pub dropped: bool,
    /// Import segments report their row count through `current_rows`.
    pub importing: bool,
    pub binlogs: Vec<FieldBinlog>,
    pub statslogs: Vec<FieldBinlog>,
    pub deltalogs: Vec<FieldBinlog>,
    /// Checkpoints for this and any other segment of the channel.
    pub checkpoints: Vec<CheckPoint>,
    pub start_positions: Vec<SegmentStartPosition>,
}

impl UpdateFlushSegmentsRequest {
    pub fn new(segment_id: SegmentId) -> Self {
        Self {
            segment_id,
            ..Self::default()
        }
    }
}

/// Segments sharing one partition and insert channel.
#[derive(Debug, Clone)]
pub struct ChanPartSegments {
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,
    pub channel_name: String,
    pub segments: Vec<Arc<SegmentEntry>>,
}

#[derive(Default)]
struct MetaState {
    segments: SegmentsInfo,
    collections: HashMap<CollectionId, Arc<CollectionInfo>>,
}

/// Coordinator segment catalog.
pub struct SegmentMeta {
    catalog: KvSegmentCatalog,
    state: RwLock<MetaState>,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
}

impl SegmentMeta {
    /// Creates the catalog and loads every persisted segment.
    pub async fn new(
        kv: Arc<dyn TxnKv>,
        config: &DataCoordConfig,
        metrics: Arc<dyn MetricsSink>,
        cancel: CancellationToken,
    ) -> CoreResult<Self> {
        let meta = Self {
            catalog: KvSegmentCatalog::new(kv, config),
            state: RwLock::new(MetaState::default()),
            metrics,
            cancel,
        };
        meta.reload().await?;
        Ok(meta)
    }

    async fn reload(&self) -> CoreResult<()> {
        let segments = with_cancellation(&self.cancel, self.catalog.list_segments()).await?;

        let mut state = self.state.write().await;
        self.metrics.set_collection_count(0);
        self.metrics.reset_segment_states();

        let mut stored_rows: BTreeMap<CollectionId, i64> = BTreeMap::new();
        let mut infos = SegmentsInfo::new();
        for segment in segments {
            self.metrics.segment_state_changed(segment.state, 1);
            if segment.state == SegmentState::Flushed {
                *stored_rows.entry(segment.collection_id).or_default() += segment.num_of_rows;
            }
            infos.set(SegmentEntry::new(segment));
        }
        for (collection_id, rows) in stored_rows {
            self.metrics.reset_stored_rows(collection_id);
            self.metrics.stored_rows_changed(collection_id, rows);
        }

        tracing::info!(segments = infos.len(), "segment meta reloaded from kv");
        state.segments = infos;
        state.collections.clear();
        Ok(())
    }

    async fn persist<F>(&self, fut: F) -> CoreResult<()>
    where
        F: Future<Output = CoreResult<()>>,
    {
        with_cancellation(&self.cancel, fut).await
    }

    // ===== Collections =====

    /// Caches collection metadata. Collections are not persisted by the catalog.
    pub async fn add_collection(&self, collection: CollectionInfo) {
        tracing::debug!(collection_id = %collection.id, "meta update: add collection");
        let mut state = self.state.write().await;
        state.collections.insert(collection.id, Arc::new(collection));
        self.metrics.set_collection_count(state.collections.len());
    }

    pub async fn get_collection(&self, collection_id: CollectionId) -> Option<Arc<CollectionInfo>> {
        self.state.read().await.collections.get(&collection_id).cloned()
    }

    /// Returns an independent copy of the cached collection.
    pub async fn get_cloned_collection_info(
        &self,
        collection_id: CollectionId,
    ) -> Option<CollectionInfo> {
        self.state
            .read()
            .await
            .collections
            .get(&collection_id)
            .map(|c| CollectionInfo::clone(c))
    }

    // ===== Single-segment mutations =====

    /// Persists and publishes a new segment.
    pub async fn add_segment(&self, segment: impl Into<SegmentEntry>) -> CoreResult<()> {
        let entry = segment.into();
        tracing::debug!(segment_id = %entry.id(), "meta update: adding segment");

        let mut state = self.state.write().await;
        if let Err(err) = self.persist(self.catalog.add_segment(&entry.info)).await {
            tracing::error!(
                segment_id = %entry.id(),
                error = %err,
                "meta update: adding segment failed"
            );
            return Err(err);
        }

        self.metrics.segment_state_changed(entry.state(), 1);
        if entry.state() == SegmentState::Flushed {
            self.metrics
                .stored_rows_changed(entry.info.collection_id, entry.info.num_of_rows);
        }
        state.segments.set(entry);
        Ok(())
    }

    /// Removes a segment from the store and memory. Unknown ids are ignored.
    pub async fn drop_segment(&self, segment_id: SegmentId) -> CoreResult<()> {
        tracing::debug!(segment_id = %segment_id, "meta update: dropping segment");

        let mut state = self.state.write().await;
        let Some(segment) = state.segments.get(segment_id) else {
            tracing::warn!(
                segment_id = %segment_id,
                "meta update: dropping segment failed - segment not found"
            );
            return Ok(());
        };

        if let Err(err) = self.persist(self.catalog.drop_segment(&segment.info)).await {
            tracing::warn!(
                segment_id = %segment_id,
                error = %err,
                "meta update: dropping segment failed"
            );
            return Err(err);
        }

        self.metrics.segment_state_changed(segment.state(), -1);
        if segment.state() == SegmentState::Flushed {
            self.metrics
                .stored_rows_changed(segment.info.collection_id, -segment.info.num_of_rows);
        }
        state.segments.remove(segment_id);
        Ok(())
    }

    /// Moves a segment to `target`.
    ///
    /// Unknown ids are ignored. The record is persisted only when the target state
    /// is healthy; memory is updated either way.
    pub async fn set_state(&self, segment_id: SegmentId, target: SegmentState) -> CoreResult<()> {
        tracing::debug!(
            segment_id = %segment_id,
            target = %target,
            "meta update: setting segment state"
        );

        let mut state = self.state.write().await;
        let Some(current) = state.segments.get(segment_id) else {
            tracing::warn!(
                segment_id = %segment_id,
                target = %target,
                "meta update: setting segment state - segment not found"
            );
            return Ok(());
        };

        let mut next = SegmentEntry::clone(&current);
        next.info.state = target;
        if target == SegmentState::Dropped && current.state() != SegmentState::Dropped {
            next.info.dropped_at = now_nanos();
        }

        if next.is_healthy() {
            if let Err(err) = self
                .persist(self.catalog.alter_segments(std::slice::from_ref(&next.info)))
                .await
            {
                tracing::error!(
                    segment_id = %segment_id,
                    target = %target,
                    error = %err,
                    "meta update: setting segment state - failed to alter segments"
                );
                return Err(err);
            }
        }

        self.record_transition(&current.info, &next.info);
        state.segments.set(next);
        Ok(())
    }

    /// Clears the importing flag of a segment.
    pub async fn unset_is_importing(&self, segment_id: SegmentId) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let current = state
            .segments
            .get(segment_id)
            .ok_or_else(|| CoreError::not_found("segment", segment_id))?;

        let mut next = SegmentEntry::clone(&current);
        next.info.is_importing = false;
        if next.is_healthy() {
            if let Err(err) = self
                .persist(self.catalog.alter_segments(std::slice::from_ref(&next.info)))
                .await
            {
                tracing::error!(
                    segment_id = %segment_id,
                    error = %err,
                    "meta update: unsetting isImporting failed"
                );
                return Err(err);
            }
        }
        state.segments.set(next);
        Ok(())
    }

    /// Records rows buffered on the data node. Memory only.
    pub async fn set_current_rows(&self, segment_id: SegmentId, rows: i64) {
        self.state
            .write()
            .await
            .segments
            .set_current_rows(segment_id, rows);
    }

    /// Memory only.
    pub async fn set_last_flush_time(&self, segment_id: SegmentId, at: DateTime<Utc>) {
        self.state.write().await.segments.set_flush_time(segment_id, at);
    }

    /// Memory only.
    pub async fn set_segment_compacting(&self, segment_id: SegmentId, compacting: bool) {
        self.state
            .write()
            .await
            .segments
            .set_is_compacting(segment_id, compacting);
    }

    /// Reserves rows on a segment.
    ///
    /// Unknown ids are ignored. The advanced expiry is persisted when the segment
    /// is healthy, before the allocation becomes visible in memory.
    pub async fn add_allocation(
        &self,
        segment_id: SegmentId,
        allocation: Allocation,
    ) -> CoreResult<()> {
        tracing::debug!(
            segment_id = %segment_id,
            num_of_rows = allocation.num_of_rows,
            expire_time = allocation.expire_time,
            "meta update: add allocation"
        );

        let mut state = self.state.write().await;
        let Some(current) = state.segments.get(segment_id) else {
            tracing::warn!(
                segment_id = %segment_id,
                "meta update: add allocation failed - segment not found"
            );
            return Ok(());
        };

        let mut next = SegmentEntry::clone(&current);
        next.push_allocation(allocation);
        if next.is_healthy() {
            if let Err(err) = self
                .persist(self.catalog.alter_segments(std::slice::from_ref(&next.info)))
                .await
            {
                tracing::error!(
                    segment_id = %segment_id,
                    error = %err,
                    "meta update: add allocation failed"
                );
                return Err(err);
            }
        }
        state.segments.set(next);
        Ok(())
    }

    /// Overwrites every allocation of a segment. Memory only.
    pub async fn set_allocations(&self, segment_id: SegmentId, allocations: Vec<Allocation>) {
        self.state
            .write()
            .await
            .segments
            .set_allocations(segment_id, allocations);
    }

    // ===== Flush and channel drop =====

    /// Applies a flush report in one atomic multi-segment write.
    ///
    /// Unknown or unhealthy target segments are ignored. Checkpoints that are not
    /// strictly newer than the stored DML position are skipped.
    pub async fn update_flush_segments_info(
        &self,
        req: UpdateFlushSegmentsRequest,
    ) -> CoreResult<()> {
        tracing::debug!(
            segment_id = %req.segment_id,
            binlogs = req.binlogs.len(),
            statslogs = req.statslogs.len(),
            deltalogs = req.deltalogs.len(),
            checkpoints = req.checkpoints.len(),
            flushed = req.flushed,
            dropped = req.dropped,
            importing = req.importing,
            "meta update: update flush segments info"
        );

        let mut state = self.state.write().await;
        let segment = match state.segments.get(req.segment_id) {
            Some(s) if s.is_healthy() => s,
            other => {
                tracing::warn!(
                    segment_id = %req.segment_id,
                    found = other.is_some(),
                    "meta update: update flush segments info - segment not found or unhealthy"
                );
                return Ok(());
            }
        };

        let mut target = SegmentEntry::clone(&segment);
        if req.importing {
            target.info.num_of_rows = target.current_rows;
        }
        if req.flushed {
            target.info.state = SegmentState::Flushing;
        }
        if req.dropped {
            target.info.state = SegmentState::Dropped;
            target.info.dropped_at = now_nanos();
        }
        target.info.binlogs = merge_field_binlogs(&target.info.binlogs, &req.binlogs);
        if !req.statslogs.is_empty() {
            target.info.statslogs = req.statslogs.clone();
        }
        target.info.deltalogs = merge_field_binlogs(&target.info.deltalogs, &req.deltalogs);

        let mut staged: BTreeMap<SegmentId, SegmentEntry> = BTreeMap::new();
        staged.insert(req.segment_id, target);

        for pos in &req.start_positions {
            let Some(start) = pos.start_position.as_ref().filter(|p| !p.msg_id.is_empty()) else {
                continue;
            };
            if let Some(s) = stage(&mut staged, &state.segments, pos.segment_id) {
                s.info.start_position = Some(start.clone());
            }
        }

        for cp in &req.checkpoints {
            let Some(s) = stage(&mut staged, &state.segments, cp.segment_id) else {
                continue;
            };
            if let Some(dml) = &s.info.dml_position {
                if dml.timestamp >= cp.position.timestamp {
                    tracing::debug!(
                        segment_id = %cp.segment_id,
                        stored_ts = dml.timestamp,
                        incoming_ts = cp.position.timestamp,
                        "ignoring stale checkpoint"
                    );
                    continue;
                }
            }
            s.info.dml_position = Some(cp.position.clone());
            s.info.num_of_rows = cp.num_of_rows;
        }

        let infos: Vec<SegmentInfo> = staged.values().map(|e| e.info.clone()).collect();
        if let Err(err) = self.persist(self.catalog.alter_segments(&infos)).await {
            tracing::error!(
                segment_id = %req.segment_id,
                error = %err,
                "meta update: update flush segments info - failed to store flush segment info"
            );
            return Err(err);
        }

        self.publish(&mut state.segments, staged);
        tracing::debug!(
            segment_id = %req.segment_id,
            "meta update: update flush segments info - complete"
        );
        Ok(())
    }

    /// Drops every segment of a retired channel.
    ///
    /// Each supplied segment still healthy in the catalog is merged into a `Dropped`
    /// copy carrying its final logs and positions. Every other live segment of the
    /// channel is force-dropped. The batch is persisted with the channel removal
    /// marker in its last transaction.
    pub async fn update_drop_channel_segment_info(
        &self,
        channel: &str,
        segments: Vec<SegmentEntry>,
    ) -> CoreResult<()> {
        tracing::debug!(channel, "meta update: update drop channel segment info");

        let mut state = self.state.write().await;
        let dropped_at = now_nanos();
        let mut staged: BTreeMap<SegmentId, SegmentEntry> = BTreeMap::new();

        for seg in &segments {
            if let Some(merged) = merge_drop_segment(&state.segments, seg, dropped_at) {
                staged.insert(seg.id(), merged);
            }
        }

        for existing in state.segments.iter() {
            if existing.info.insert_channel != channel
                || existing.state() == SegmentState::Dropped
                || staged.contains_key(&existing.id())
            {
                continue;
            }
            let mut cloned = SegmentEntry::clone(existing);
            cloned.info.state = SegmentState::Dropped;
            cloned.info.dropped_at = dropped_at;
            staged.insert(cloned.id(), cloned);
        }

        let infos: Vec<SegmentInfo> = staged.values().map(|e| e.info.clone()).collect();
        if let Err(err) = self
            .persist(
                self.catalog
                    .save_dropped_segments_and_mark_channel(channel, &infos),
            )
            .await
        {
            tracing::error!(
                channel,
                error = %err,
                "meta update: update drop channel segment info failed"
            );
            return Err(err);
        }

        let dropped = staged.len();
        self.publish(&mut state.segments, staged);
        tracing::info!(
            channel,
            dropped,
            "meta update: update drop channel segment info - complete"
        );
        Ok(())
    }

    // ===== Compaction =====

    /// Computes the metadata change for a finished compaction without applying it.
    ///
    /// Every source must be tracked and `Flushed`, otherwise
    /// `InvalidCompactionSource` lists the offenders.
    pub async fn get_complete_compaction_meta(
        &self,
        source_logs: &[CompactionSegmentBinlogs],
        result: &CompactionResult,
    ) -> CoreResult<CompactionMeta> {
        let state = self.state.read().await;

        let mut sources = Vec::with_capacity(source_logs.len());
        let mut offenders = Vec::new();
        for log in source_logs {
            match state.segments.get(log.segment_id) {
                Some(s) if s.state() == SegmentState::Flushed => sources.push(s),
                _ => offenders.push(log.segment_id),
            }
        }
        if !offenders.is_empty() || sources.is_empty() {
            return Err(CoreError::InvalidCompactionSource(offenders));
        }

        let meta = build_compaction_meta(&sources, source_logs, result, now_nanos())?;
        tracing::info!(
            segment_id = %meta.new_segment.id(),
            collection_id = %meta.new_segment.info.collection_id,
            num_rows = meta.new_segment.info.num_of_rows,
            compaction_from = ?meta.new_segment.info.compaction_from,
            "meta update: get complete compaction meta"
        );
        Ok(meta)
    }

    /// Forward saga step: persists dropped sources and the new segment atomically.
    pub async fn alter_meta_store_after_compaction(
        &self,
        modified: &[SegmentEntry],
        new_segment: &SegmentEntry,
    ) -> CoreResult<()> {
        let _guard = self.state.write().await;
        let infos: Vec<SegmentInfo> = modified.iter().map(|e| e.info.clone()).collect();
        self.persist(
            self.catalog
                .alter_segments_and_add_new_segment(&infos, &new_segment.info),
        )
        .await
    }

    /// Compensating saga step: restores the sources and removes the new segment.
    pub async fn revert_alter_meta_store_after_compaction(
        &self,
        old_segments: &[SegmentInfo],
        new_segment: &SegmentInfo,
    ) -> CoreResult<()> {
        tracing::debug!(
            collection_id = %new_segment.collection_id,
            partition_id = %new_segment.partition_id,
            compacted_to = %new_segment.id,
            compacted_from = ?new_segment.compaction_from,
            "revert metastore after compaction failure"
        );
        let _guard = self.state.write().await;
        self.persist(
            self.catalog
                .revert_alter_segments_and_add_new_segment(old_segments, new_segment),
        )
        .await
    }

    /// Publishes a committed compaction in memory.
    ///
    /// The new segment is only inserted when it holds rows.
    pub async fn alter_in_memory_meta_after_compaction(
        &self,
        new_segment: SegmentEntry,
        modified: Vec<SegmentEntry>,
    ) {
        tracing::debug!(
            compact_to = %new_segment.id(),
            compact_from = ?modified.iter().map(SegmentEntry::id).collect::<Vec<_>>(),
            "meta update: alter in memory meta after compaction"
        );

        let mut state = self.state.write().await;
        let mut staged: BTreeMap<SegmentId, SegmentEntry> =
            modified.into_iter().map(|e| (e.id(), e)).collect();
        if new_segment.info.num_of_rows > 0 {
            staged.insert(new_segment.id(), new_segment);
        }
        self.publish(&mut state.segments, staged);
    }

    /// Runs the whole compaction commit.
    ///
    /// The store is altered first; `acknowledge` then confirms the outcome with
    /// the data node. If it fails the store is reverted and memory is never
    /// touched.
    pub async fn complete_compaction<F, Fut>(
        &self,
        source_logs: &[CompactionSegmentBinlogs],
        result: &CompactionResult,
        acknowledge: F,
    ) -> CoreResult<CompactionMeta>
    where
        F: FnOnce(&CompactionMeta) -> Fut,
        Fut: Future<Output = CoreResult<()>>,
    {
        let meta = self.get_complete_compaction_meta(source_logs, result).await?;
        self.alter_meta_store_after_compaction(&meta.modified_sources, &meta.new_segment)
            .await?;

        if let Err(err) = acknowledge(&meta).await {
            tracing::warn!(
                plan_id = %result.plan_id,
                segment_id = %meta.new_segment.id(),
                error = %err,
                "compaction not acknowledged, reverting meta store"
            );
            if let Err(revert_err) = self
                .revert_alter_meta_store_after_compaction(
                    &meta.old_segments,
                    &meta.new_segment.info,
                )
                .await
            {
                tracing::error!(
                    plan_id = %result.plan_id,
                    error = %revert_err,
                    "failed to revert meta store after compaction"
                );
            }
            return Err(err);
        }

        self.alter_in_memory_meta_after_compaction(
            meta.new_segment.clone(),
            meta.modified_sources.clone(),
        )
        .await;
        Ok(meta)
    }

    // ===== Queries =====

    /// Healthy segment by id.
    pub async fn get_segment(&self, segment_id: SegmentId) -> Option<Arc<SegmentEntry>> {
        self.state
            .read()
            .await
            .segments
            .get(segment_id)
            .filter(|s| s.is_healthy())
    }

    /// Segment by id, including dropped ones.
    pub async fn get_segment_unsafe(&self, segment_id: SegmentId) -> Option<Arc<SegmentEntry>> {
        self.state.read().await.segments.get(segment_id)
    }

    pub async fn get_all_segments_unsafe(&self) -> Vec<Arc<SegmentEntry>> {
        self.select_segments(|_| true).await
    }

    /// Healthy segments of an insert channel.
    pub async fn get_segments_by_channel(&self, channel: &str) -> Vec<Arc<SegmentEntry>> {
        self.select_segments(|s| s.is_healthy() && s.info.insert_channel == channel)
            .await
    }

    /// Healthy segments of a collection.
    pub async fn get_segments_of_collection(
        &self,
        collection_id: CollectionId,
    ) -> Vec<Arc<SegmentEntry>> {
        self.select_segments(|s| s.is_healthy() && s.info.collection_id == collection_id)
            .await
    }

    pub async fn get_segment_ids_of_collection(&self, collection_id: CollectionId) -> Vec<SegmentId> {
        self.select_ids(|s| s.is_healthy() && s.info.collection_id == collection_id)
            .await
    }

    /// Like [`Self::get_segment_ids_of_collection`] but keeps dropped segments.
    pub async fn get_segment_ids_of_collection_with_dropped(
        &self,
        collection_id: CollectionId,
    ) -> Vec<SegmentId> {
        self.select_ids(|s| exists(s) && s.info.collection_id == collection_id)
            .await
    }

    pub async fn get_segment_ids_of_partition(
        &self,
        collection_id: CollectionId,
        partition_id: PartitionId,
    ) -> Vec<SegmentId> {
        self.select_ids(|s| {
            s.is_healthy()
                && s.info.collection_id == collection_id
                && s.info.partition_id == partition_id
        })
        .await
    }

    pub async fn get_segment_ids_of_partition_with_dropped(
        &self,
        collection_id: CollectionId,
        partition_id: PartitionId,
    ) -> Vec<SegmentId> {
        self.select_ids(|s| {
            exists(s) && s.info.collection_id == collection_id && s.info.partition_id == partition_id
        })
        .await
    }

    /// Sum of `num_of_rows` over healthy segments of a collection.
    pub async fn get_num_rows_of_collection(&self, collection_id: CollectionId) -> i64 {
        self.state
            .read()
            .await
            .segments
            .iter()
            .filter(|s| s.is_healthy() && s.info.collection_id == collection_id)
            .map(|s| s.info.num_of_rows)
            .sum()
    }

    pub async fn get_num_rows_of_partition(
        &self,
        collection_id: CollectionId,
        partition_id: PartitionId,
    ) -> i64 {
        self.state
            .read()
            .await
            .segments
            .iter()
            .filter(|s| {
                s.is_healthy()
                    && s.info.collection_id == collection_id
                    && s.info.partition_id == partition_id
            })
            .map(|s| s.info.num_of_rows)
            .sum()
    }

    /// Segments still accepting or holding unflushed data (`Growing` or `Sealed`).
    pub async fn get_unflushed_segments(&self) -> Vec<Arc<SegmentEntry>> {
        self.select_segments(|s| {
            matches!(s.state(), SegmentState::Growing | SegmentState::Sealed)
        })
        .await
    }

    pub async fn get_flushing_segments(&self) -> Vec<Arc<SegmentEntry>> {
        self.select_segments(|s| s.state() == SegmentState::Flushing)
            .await
    }

    /// Segments matching `selector`, in id order.
    pub async fn select_segments<P>(&self, selector: P) -> Vec<Arc<SegmentEntry>>
    where
        P: Fn(&SegmentEntry) -> bool,
    {
        self.state
            .read()
            .await
            .segments
            .iter()
            .filter(|s| selector(s))
            .cloned()
            .collect()
    }

    /// Segments matching `selector`, grouped by partition and channel.
    pub async fn get_segments_chan_part<P>(&self, selector: P) -> Vec<ChanPartSegments>
    where
        P: Fn(&SegmentEntry) -> bool,
    {
        let state = self.state.read().await;
        let mut groups: BTreeMap<(PartitionId, String), ChanPartSegments> = BTreeMap::new();
        for segment in state.segments.iter().filter(|s| selector(s)) {
            let key = (segment.info.partition_id, segment.info.insert_channel.clone());
            groups
                .entry(key)
                .or_insert_with(|| ChanPartSegments {
                    collection_id: segment.info.collection_id,
                    partition_id: segment.info.partition_id,
                    channel_name: segment.info.insert_channel.clone(),
                    segments: Vec::new(),
                })
                .segments
                .push(Arc::clone(segment));
        }
        groups.into_values().collect()
    }

    /// Total bytes of every log file tracked by the catalog.
    pub async fn get_total_binlog_size(&self) -> i64 {
        self.state
            .read()
            .await
            .segments
            .iter()
            .map(|s| s.info.log_size())
            .sum()
    }

    /// Succeeds when every id is tracked, in any state.
    pub async fn has_segments(&self, segment_ids: &[SegmentId]) -> CoreResult<bool> {
        let state = self.state.read().await;
        match segment_ids.iter().find(|id| !state.segments.contains(**id)) {
            Some(missing) => Err(CoreError::not_found("segment", missing)),
            None => Ok(true),
        }
    }

    /// Whether the channel removal marker has been persisted.
    pub async fn is_channel_dropped(&self, channel: &str) -> CoreResult<bool> {
        with_cancellation(&self.cancel, self.catalog.is_channel_deleted(channel)).await
    }

    // ===== Helpers =====

    async fn select_ids<P>(&self, selector: P) -> Vec<SegmentId>
    where
        P: Fn(&SegmentEntry) -> bool,
    {
        self.select_segments(selector)
            .await
            .iter()
            .map(|s| s.id())
            .collect()
    }

    fn publish(&self, segments: &mut SegmentsInfo, staged: BTreeMap<SegmentId, SegmentEntry>) {
        for (id, next) in staged {
            match segments.get(id) {
                Some(previous) => self.record_transition(&previous.info, &next.info),
                None => {
                    self.metrics.segment_state_changed(next.state(), 1);
                    if next.state() == SegmentState::Flushed {
                        self.metrics
                            .stored_rows_changed(next.info.collection_id, next.info.num_of_rows);
                    }
                }
            }
            segments.set(next);
        }
    }

    fn record_transition(&self, old: &SegmentInfo, new: &SegmentInfo) {
        if old.state != new.state {
            self.metrics.segment_state_changed(old.state, -1);
            self.metrics.segment_state_changed(new.state, 1);
        }
        let collection_id = new.collection_id;
        match (old.state == SegmentState::Flushed, new.state == SegmentState::Flushed) {
            (false, true) => self.metrics.stored_rows_changed(collection_id, new.num_of_rows),
            (true, false) => self.metrics.stored_rows_changed(collection_id, -old.num_of_rows),
            (true, true) if old.num_of_rows != new.num_of_rows => self
                .metrics
                .stored_rows_changed(collection_id, new.num_of_rows - old.num_of_rows),
            _ => {}
        }
    }
}

/// Adds a clone of a healthy tracked segment to the staging map if absent.
fn stage<'a>(
    staged: &'a mut BTreeMap<SegmentId, SegmentEntry>,
    segments: &SegmentsInfo,
    segment_id: SegmentId,
) -> Option<&'a mut SegmentEntry> {
    if !staged.contains_key(&segment_id) {
        let current = segments.get(segment_id).filter(|s| s.is_healthy())?;
        staged.insert(segment_id, SegmentEntry::clone(&current));
    }
    staged.get_mut(&segment_id)
}

fn merge_drop_segment(
    segments: &SegmentsInfo,
    to_drop: &SegmentEntry,
    dropped_at: u64,
) -> Option<SegmentEntry> {
    let Some(current) = segments.get(to_drop.id()).filter(|s| s.is_healthy()) else {
        tracing::warn!(
            segment_id = %to_drop.id(),
            "update drop channel skipping missing or unhealthy segment"
        );
        return None;
    };

    let mut merged = SegmentEntry::clone(&current);
    merged.info.state = SegmentState::Dropped;
    merged.info.dropped_at = dropped_at;
    merged.info.binlogs = merge_field_binlogs(&merged.info.binlogs, &to_drop.info.binlogs);
    merged.info.statslogs = merge_field_binlogs(&merged.info.statslogs, &to_drop.info.statslogs);
    merged.info.deltalogs = merge_field_binlogs(&merged.info.deltalogs, &to_drop.info.deltalogs);
    if let Some(start) = &to_drop.info.start_position {
        merged.info.start_position = Some(start.clone());
    }
    if let Some(dml) = &to_drop.info.dml_position {
        merged.info.dml_position = Some(dml.clone());
    }
    merged.current_rows = to_drop.current_rows;
    Some(merged)
}

fn exists(segment: &SegmentEntry) -> bool {
    !matches!(segment.state(), SegmentState::None | SegmentState::NotExist)
}

fn now_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map_or(0, |nanos| u64::try_from(nanos).unwrap_or(0))
}
