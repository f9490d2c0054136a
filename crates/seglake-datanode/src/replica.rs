//! Segment replica of one collection on a data node.
//!
//! Segments live in one of four buckets: *new*, *normal*, *flushed* and
//! *compacted*. A single `parking_lot::RwLock` guards all of them; it is never
//! held across an await, so schema lookups and stats-log reads happen before the
//! lock is taken.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use seglake_core::binlog::log_paths_of_field;
use seglake_core::{
    with_cancellation, BlobStore, CollectionId, CollectionSchema, CoreError, CoreResult,
    DataNodeConfig, FieldBinlog, FieldData, FieldId, MetricsSink, MsgPosition, NodeId,
    PartitionId, PkIndexConfig, PlanId, PrometheusMetrics, SegmentId, SegmentStartPosition,
    SegmentStats, Timestamp,
};
use seglake_index::{deserialize_stats, PkType, PrimaryKey, PrimaryKeyIndex};
use seglake_metadata::CollectionSchemaCache;

use crate::segment::{Segment, SegmentCheckPoint, SegmentType};

/// Registration of a segment with the replica.
#[derive(Debug, Clone)]
pub struct AddSegmentRequest {
    pub segment_type: SegmentType,
    pub segment_id: SegmentId,
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,
    pub channel_name: String,
    /// Zero for new segments.
    pub num_of_rows: i64,
    pub start_pos: Option<MsgPosition>,
    pub end_pos: Option<MsgPosition>,
    /// Last checkpoint of a recovered normal segment.
    pub checkpoint: Option<SegmentCheckPoint>,
    /// Stats logs to rebuild the primary-key index from.
    pub statslogs: Vec<FieldBinlog>,
    /// Schema version to size or decode the index with.
    pub recover_ts: Timestamp,
    pub importing: bool,
}

impl AddSegmentRequest {
    pub fn new(
        segment_type: SegmentType,
        segment_id: SegmentId,
        collection_id: CollectionId,
        partition_id: PartitionId,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            segment_type,
            segment_id,
            collection_id,
            partition_id,
            channel_name: channel_name.into(),
            num_of_rows: 0,
            start_pos: None,
            end_pos: None,
            checkpoint: None,
            statslogs: Vec::new(),
            recover_ts: 0,
            importing: false,
        }
    }
}

/// Segment produced by a compaction on this node.
#[derive(Debug, Clone)]
pub struct CompactedSegment {
    pub segment_id: SegmentId,
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,
    pub channel_name: String,
    pub num_rows: i64,
}

#[derive(Default)]
struct Buckets {
    new: BTreeMap<SegmentId, Segment>,
    normal: BTreeMap<SegmentId, Segment>,
    flushed: BTreeMap<SegmentId, Segment>,
    compacted: BTreeMap<SegmentId, Segment>,
}

impl Buckets {
    /// Looks a segment up in the new, normal and flushed buckets.
    fn live(&self, segment_id: SegmentId) -> Option<&Segment> {
        self.new
            .get(&segment_id)
            .or_else(|| self.normal.get(&segment_id))
            .or_else(|| self.flushed.get(&segment_id))
    }

    fn live_mut(&mut self, segment_id: SegmentId) -> Option<&mut Segment> {
        if let Some(seg) = self.new.get_mut(&segment_id) {
            return Some(seg);
        }
        if let Some(seg) = self.normal.get_mut(&segment_id) {
            return Some(seg);
        }
        self.flushed.get_mut(&segment_id)
    }

    fn unflushed_mut(&mut self, segment_id: SegmentId) -> Option<&mut Segment> {
        if let Some(seg) = self.new.get_mut(&segment_id) {
            return Some(seg);
        }
        self.normal.get_mut(&segment_id)
    }

    fn iter_live(&self) -> impl Iterator<Item = &Segment> {
        self.new
            .values()
            .chain(self.normal.values())
            .chain(self.flushed.values())
    }
}

/// Data-node segment registry for one collection.
pub struct SegmentReplica {
    collection_id: CollectionId,
    node_id: NodeId,
    pk_config: PkIndexConfig,
    schema_cache: Arc<CollectionSchemaCache>,
    blob_store: Arc<dyn BlobStore>,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
    segments: RwLock<Buckets>,
}

impl SegmentReplica {
    pub fn new(
        collection_id: CollectionId,
        schema_cache: Arc<CollectionSchemaCache>,
        blob_store: Arc<dyn BlobStore>,
        config: &DataNodeConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            collection_id,
            node_id: config.node_id,
            pk_config: config.pk_index(),
            schema_cache,
            blob_store,
            metrics: Arc::new(PrometheusMetrics),
            cancel,
            segments: RwLock::new(Buckets::default()),
        }
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    fn check_collection(&self, collection_id: CollectionId) -> CoreResult<()> {
        if collection_id != self.collection_id {
            tracing::warn!(
                expected = %self.collection_id,
                actual = %collection_id,
                "collection mismatch"
            );
            return Err(CoreError::CollectionMismatch {
                expected: self.collection_id,
                actual: collection_id,
            });
        }
        Ok(())
    }

    /// Schema of the replica's collection as of `ts` (`0` for latest).
    pub async fn collection_schema(
        &self,
        collection_id: CollectionId,
        ts: Timestamp,
    ) -> CoreResult<Arc<CollectionSchema>> {
        self.check_collection(collection_id)?;
        self.schema_cache.get(collection_id, ts).await
    }

    async fn primary_key_of(
        &self,
        ts: Timestamp,
    ) -> CoreResult<(Arc<CollectionSchema>, FieldId, PkType)> {
        let schema = self.collection_schema(self.collection_id, ts).await?;
        let (field_id, pk_type) = {
            let field = schema.primary_key_field()?;
            (field.field_id, PkType::from_data_type(field.data_type)?)
        };
        Ok((schema, field_id, pk_type))
    }

    /// Loads the segment's index from its stats logs, or sizes a fresh one.
    async fn init_pk_index(
        &self,
        segment_id: SegmentId,
        statslogs: &[FieldBinlog],
        ts: Timestamp,
    ) -> CoreResult<PrimaryKeyIndex> {
        let (schema, pk_field, pk_type) = self.primary_key_of(ts).await?;

        let paths = log_paths_of_field(statslogs, pk_field);

        if paths.is_empty() {
            let rows = self
                .pk_config
                .max_row_count(schema.estimate_size_per_record());
            tracing::debug!(
                segment_id = %segment_id,
                estimated_rows = rows,
                "no stats logs to load, building a fresh primary key index"
            );
            return Ok(PrimaryKeyIndex::build(
                pk_field,
                pk_type,
                rows,
                self.pk_config.false_positive_rate,
            ));
        }

        tracing::info!(
            segment_id = %segment_id,
            files = paths.len(),
            "loading primary key index from stats logs"
        );
        let blobs = with_cancellation(&self.cancel, self.blob_store.multi_read(&paths))
            .await
            .map_err(|e| {
                tracing::warn!(
                    segment_id = %segment_id,
                    error = %e,
                    "failed to read stats logs"
                );
                e
            })?;
        let stats = deserialize_stats(&blobs)?;
        let index = PrimaryKeyIndex::from_stats_list(stats)?
            .ok_or_else(|| CoreError::internal("stats logs decoded to nothing"))?;
        if index.pk_type() != pk_type {
            return Err(CoreError::PrimaryKeyTypeMismatch {
                expected: pk_type.as_str(),
                actual: index.pk_type().as_str(),
            });
        }
        Ok(index)
    }

    /// Registers a segment in the bucket named by its type.
    pub async fn add_segment(&self, req: AddSegmentRequest) -> CoreResult<()> {
        self.check_collection(req.collection_id)?;
        tracing::info!(
            segment_type = %req.segment_type,
            segment_id = %req.segment_id,
            collection_id = %req.collection_id,
            partition_id = %req.partition_id,
            channel = %req.channel_name,
            statslogs = req.statslogs.len(),
            recover_ts = req.recover_ts,
            importing = req.importing,
            "adding segment"
        );

        let pk_index = self
            .init_pk_index(req.segment_id, &req.statslogs, req.recover_ts)
            .await
            .map_err(|e| {
                tracing::error!(
                    segment_id = %req.segment_id,
                    error = %e,
                    "failed to init primary key index"
                );
                e
            })?;

        let mut seg = Segment {
            collection_id: req.collection_id,
            partition_id: req.partition_id,
            segment_id: req.segment_id,
            channel_name: req.channel_name,
            num_rows: req.num_of_rows,
            memory_size: 0,
            compacted_to: None,
            checkpoint: None,
            start_pos: None,
            end_pos: None,
            pk_index,
        };
        if req.importing || req.segment_type == SegmentType::New {
            seg.checkpoint = req.start_pos.clone().map(|position| SegmentCheckPoint {
                num_rows: 0,
                position,
            });
            seg.start_pos = req.start_pos;
            seg.end_pos = req.end_pos;
        }
        if req.segment_type == SegmentType::Normal {
            if let Some(cp) = req.checkpoint {
                seg.end_pos = Some(cp.position.clone());
                seg.checkpoint = Some(cp);
            }
        }

        {
            let mut buckets = self.segments.write();
            let bucket = match req.segment_type {
                SegmentType::New => &mut buckets.new,
                SegmentType::Normal => &mut buckets.normal,
                SegmentType::Flushed => &mut buckets.flushed,
            };
            bucket.insert(req.segment_id, seg);
        }
        if req.segment_type.is_unflushed() {
            self.metrics.unflushed_segments_changed(self.node_id, 1);
        }
        Ok(())
    }

    /// Adds the keys of an insert batch to a segment's index.
    ///
    /// Unknown segments are ignored.
    pub fn update_primary_key_range(&self, segment_id: SegmentId, ids: &FieldData) -> CoreResult<()> {
        let mut buckets = self.segments.write();
        match buckets.live_mut(segment_id) {
            Some(seg) => seg.update_pk_range(ids),
            None => {
                tracing::warn!(
                    segment_id = %segment_id,
                    "no matching segment to update primary key range"
                );
                Ok(())
            }
        }
    }

    /// Adds `rows` to an unflushed segment and resets its buffered size.
    pub fn update_statistics(&self, segment_id: SegmentId, rows: i64) {
        tracing::debug!(segment_id = %segment_id, rows, "updating segment statistics");
        let mut buckets = self.segments.write();
        match buckets.unflushed_mut(segment_id) {
            Some(seg) => {
                seg.memory_size = 0;
                seg.num_rows += rows;
            }
            None => tracing::warn!(
                segment_id = %segment_id,
                "update statistics on unknown or flushed segment"
            ),
        }
    }

    /// Replaces the row count of a flushed segment.
    pub fn refresh_flushed_statistics(&self, segment_id: SegmentId, rows: i64) {
        let mut buckets = self.segments.write();
        match buckets.flushed.get_mut(&segment_id) {
            Some(seg) => {
                seg.memory_size = 0;
                seg.num_rows = rows;
            }
            None => tracing::warn!(
                segment_id = %segment_id,
                "refresh row count on segment that is not flushed"
            ),
        }
    }

    /// Accounts bytes buffered in memory for an unflushed segment.
    pub fn add_memory_size(&self, segment_id: SegmentId, bytes: i64) {
        if let Some(seg) = self.segments.write().unflushed_mut(segment_id) {
            seg.memory_size += bytes;
        }
    }

    pub fn memory_size(&self, segment_id: SegmentId) -> Option<i64> {
        self.segments.read().live(segment_id).map(|s| s.memory_size)
    }

    pub fn segment_statistics_updates(&self, segment_id: SegmentId) -> CoreResult<SegmentStats> {
        self.segments
            .read()
            .live(segment_id)
            .map(|seg| SegmentStats {
                segment_id,
                num_rows: seg.num_rows,
            })
            .ok_or_else(|| CoreError::not_found("segment", segment_id))
    }

    /// Reports start positions of new segments and moves them to *normal*.
    pub fn list_new_segments_start_positions(&self) -> Vec<SegmentStartPosition> {
        let mut buckets = self.segments.write();
        let moved = std::mem::take(&mut buckets.new);
        let mut positions = Vec::with_capacity(moved.len());
        for (id, seg) in moved {
            positions.push(SegmentStartPosition {
                segment_id: id,
                start_position: seg.start_pos.clone(),
            });
            buckets.normal.insert(id, seg);
        }
        positions
    }

    /// Checkpoints of every unflushed segment that has one.
    pub fn list_segments_checkpoints(&self) -> BTreeMap<SegmentId, SegmentCheckPoint> {
        let buckets = self.segments.read();
        buckets
            .new
            .iter()
            .chain(buckets.normal.iter())
            .filter_map(|(id, seg)| seg.checkpoint.clone().map(|cp| (*id, cp)))
            .collect()
    }

    pub fn update_segment_end_position(&self, segment_id: SegmentId, end_pos: MsgPosition) {
        match self.segments.write().unflushed_mut(segment_id) {
            Some(seg) => seg.end_pos = Some(end_pos),
            None => tracing::warn!(segment_id = %segment_id, "no matching segment for end position"),
        }
    }

    /// Moves the checkpoint of an unflushed segment to its end position.
    pub fn update_segment_checkpoint(&self, segment_id: SegmentId) {
        let mut buckets = self.segments.write();
        match buckets.unflushed_mut(segment_id) {
            Some(seg) => {
                if !seg.advance_checkpoint() {
                    tracing::warn!(
                        segment_id = %segment_id,
                        "segment has no end position, checkpoint unchanged"
                    );
                }
            }
            None => tracing::warn!(segment_id = %segment_id, "no matching segment for checkpoint"),
        }
    }

    /// Moves a new or normal segment to *flushed*.
    pub fn segment_flushed(&self, segment_id: SegmentId) {
        let mut buckets = self.segments.write();
        let seg = buckets
            .new
            .remove(&segment_id)
            .or_else(|| buckets.normal.remove(&segment_id));
        if let Some(seg) = seg {
            buckets.flushed.insert(segment_id, seg);
            self.metrics.unflushed_segments_changed(self.node_id, -1);
        }
    }

    /// Replaces flushed sources with the segment a compaction produced.
    ///
    /// Every source must be flushed and not yet compacted, and the target may not be
    /// one of its own sources. The target gets a copy
    /// of the first source's index merged with the others, and only enters
    /// *flushed* when it holds rows.
    pub fn merge_flushed_segments(
        &self,
        target: CompactedSegment,
        plan_id: PlanId,
        compacted_from: &[SegmentId],
    ) -> CoreResult<()> {
        self.check_collection(target.collection_id)?;

        let mut buckets = self.segments.write();
        let offenders: Vec<SegmentId> = compacted_from
            .iter()
            .copied()
            .filter(|id| *id == target.segment_id || !buckets.flushed.contains_key(id))
            .collect();
        if !offenders.is_empty() || compacted_from.is_empty() {
            tracing::warn!(
                plan_id = %plan_id,
                segment_id = %target.segment_id,
                invalid = ?offenders,
                "no matching flushed segments to merge from"
            );
            return Err(CoreError::InvalidCompactionSource(offenders));
        }

        let mut sources = compacted_from.iter().filter_map(|id| buckets.flushed.get(id));
        let mut pk_index = sources
            .next()
            .map(|s| s.pk_index.clone())
            .ok_or_else(|| CoreError::InvalidCompactionSource(Vec::new()))?;
        for source in sources {
            pk_index.merge(&source.pk_index)?;
        }

        tracing::info!(
            plan_id = %plan_id,
            segment_id = %target.segment_id,
            compacted_from = ?compacted_from,
            num_rows = target.num_rows,
            "merging flushed segments"
        );
        for id in compacted_from {
            if let Some(mut seg) = buckets.flushed.remove(id) {
                seg.compacted_to = Some(target.segment_id);
                buckets.compacted.insert(*id, seg);
            }
        }

        if target.num_rows > 0 {
            buckets.flushed.insert(
                target.segment_id,
                Segment {
                    collection_id: target.collection_id,
                    partition_id: target.partition_id,
                    segment_id: target.segment_id,
                    channel_name: target.channel_name,
                    num_rows: target.num_rows,
                    memory_size: 0,
                    compacted_to: None,
                    checkpoint: None,
                    start_pos: None,
                    end_pos: None,
                    pk_index,
                },
            );
        }
        Ok(())
    }

    /// Compaction ancestry: target id to the ids it was compacted from.
    pub fn list_compacted_segment_ids(&self) -> BTreeMap<SegmentId, Vec<SegmentId>> {
        let buckets = self.segments.read();
        let mut to_from: BTreeMap<SegmentId, Vec<SegmentId>> = BTreeMap::new();
        for (id, seg) in &buckets.compacted {
            if let Some(to) = seg.compacted_to {
                to_from.entry(to).or_default().push(*id);
            }
        }
        to_from
    }

    /// Forgets segments in every bucket. Unknown ids are ignored.
    pub fn remove_segments(&self, segment_ids: &[SegmentId]) {
        tracing::info!(segment_ids = ?segment_ids, "removing segments if present");
        let mut buckets = self.segments.write();
        let mut unflushed = 0;
        for id in segment_ids {
            if buckets.new.remove(id).is_some() || buckets.normal.remove(id).is_some() {
                unflushed += 1;
            }
            buckets.flushed.remove(id);
            buckets.compacted.remove(id);
        }
        if unflushed > 0 {
            self.metrics
                .unflushed_segments_changed(self.node_id, -unflushed);
        }
    }

    /// Whether the segment is unflushed, or flushed when `count_flushed` is set.
    pub fn has_segment(&self, segment_id: SegmentId, count_flushed: bool) -> bool {
        let buckets = self.segments.read();
        buckets.new.contains_key(&segment_id)
            || buckets.normal.contains_key(&segment_id)
            || (count_flushed && buckets.flushed.contains_key(&segment_id))
    }

    pub fn list_all_segment_ids(&self) -> Vec<SegmentId> {
        self.segments
            .read()
            .iter_live()
            .map(Segment::segment_id)
            .collect()
    }

    pub fn list_not_flushed_segment_ids(&self) -> Vec<SegmentId> {
        let buckets = self.segments.read();
        buckets
            .new
            .keys()
            .chain(buckets.normal.keys())
            .copied()
            .collect()
    }

    pub fn list_partition_segments(&self, partition_id: PartitionId) -> Vec<SegmentId> {
        self.segments
            .read()
            .iter_live()
            .filter(|s| s.partition_id == partition_id)
            .map(Segment::segment_id)
            .collect()
    }

    /// Live segments of `channel`, limited to `partition_id` unless it is
    /// [`PartitionId::ALL`].
    pub fn filter_segments(&self, channel: &str, partition_id: PartitionId) -> Vec<SegmentId> {
        self.segments
            .read()
            .iter_live()
            .filter(|s| s.matches(channel, partition_id))
            .map(Segment::segment_id)
            .collect()
    }

    /// Live segments of the channel whose index might hold `pk`.
    pub fn segments_might_contain(
        &self,
        channel: &str,
        partition_id: PartitionId,
        pk: &PrimaryKey,
    ) -> Vec<SegmentId> {
        self.segments
            .read()
            .iter_live()
            .filter(|s| s.matches(channel, partition_id) && s.might_contain(pk))
            .map(Segment::segment_id)
            .collect()
    }

    /// Current `[min, max]` primary keys of a live segment, `None` while empty.
    pub fn pk_range(&self, segment_id: SegmentId) -> CoreResult<Option<(PrimaryKey, PrimaryKey)>> {
        let buckets = self.segments.read();
        let seg = buckets
            .live(segment_id)
            .ok_or_else(|| CoreError::not_found("segment", segment_id))?;
        let index = seg.pk_index();
        Ok(index.min_pk().cloned().zip(index.max_pk().cloned()))
    }

    pub fn collection_and_partition_id(
        &self,
        segment_id: SegmentId,
    ) -> CoreResult<(CollectionId, PartitionId)> {
        self.segments
            .read()
            .live(segment_id)
            .map(|s| (s.collection_id, s.partition_id))
            .ok_or_else(|| CoreError::not_found("segment", segment_id))
    }

    pub fn channel_name(&self, segment_id: SegmentId) -> CoreResult<String> {
        self.segments
            .read()
            .live(segment_id)
            .map(|s| s.channel_name.clone())
            .ok_or_else(|| CoreError::not_found("segment", segment_id))
    }

    /// Serialized stats log of a live segment's primary-key index.
    pub async fn segment_statslog(&self, segment_id: SegmentId) -> CoreResult<Bytes> {
        let (_, pk_field, pk_type) = self.primary_key_of(0).await?;
        let buckets = self.segments.read();
        buckets
            .live(segment_id)
            .ok_or_else(|| CoreError::not_found("segment", segment_id))?
            .statslog(pk_field, pk_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seglake_core::{DataType, FieldSchema, NoopMetrics, SchemaProvider};
    use seglake_storage::MemoryBlobStore;

    struct FixedSchema;

    #[async_trait]
    impl SchemaProvider for FixedSchema {
        async fn collection_schema(
            &self,
            _collection_id: CollectionId,
            _ts: Timestamp,
        ) -> CoreResult<CollectionSchema> {
            Ok(CollectionSchema::new(
                "docs",
                vec![
                    FieldSchema::new(FieldId::new(100), "id", DataType::Int64).primary(),
                    FieldSchema::new(FieldId::new(101), "vec", DataType::FloatVector).with_dim(8),
                ],
            ))
        }
    }

    fn replica() -> SegmentReplica {
        let config = DataNodeConfig {
            segment_max_size_mb: 0.01,
            ..DataNodeConfig::default()
        };
        SegmentReplica::new(
            CollectionId::new(1),
            Arc::new(CollectionSchemaCache::new(
                Arc::new(FixedSchema),
                CancellationToken::new(),
            )),
            Arc::new(MemoryBlobStore::new()),
            &config,
            CancellationToken::new(),
        )
        .with_metrics(Arc::new(NoopMetrics))
    }

    fn request(segment_type: SegmentType, id: i64, partition: i64) -> AddSegmentRequest {
        let mut req = AddSegmentRequest::new(
            segment_type,
            SegmentId::new(id),
            CollectionId::new(1),
            PartitionId::new(partition),
            "ch-1",
        );
        req.start_pos = Some(MsgPosition::new("ch-1", vec![1], 10));
        req
    }

    #[tokio::test]
    async fn test_new_segment_lifecycle() {
        let replica = replica();
        replica
            .add_segment(request(SegmentType::New, 1, 10))
            .await
            .unwrap();
        assert!(replica.has_segment(SegmentId::new(1), false));

        let checkpoints = replica.list_segments_checkpoints();
        assert_eq!(checkpoints[&SegmentId::new(1)].num_rows, 0);
        assert_eq!(checkpoints[&SegmentId::new(1)].position.timestamp, 10);

        let positions = replica.list_new_segments_start_positions();
        assert_eq!(positions.len(), 1);
        assert!(replica.list_new_segments_start_positions().is_empty());
        assert_eq!(replica.list_not_flushed_segment_ids(), vec![SegmentId::new(1)]);

        replica.update_statistics(SegmentId::new(1), 5);
        replica.update_segment_end_position(
            SegmentId::new(1),
            MsgPosition::new("ch-1", vec![2], 20),
        );
        replica.update_segment_checkpoint(SegmentId::new(1));
        let cp = &replica.list_segments_checkpoints()[&SegmentId::new(1)];
        assert_eq!((cp.num_rows, cp.position.timestamp), (5, 20));

        replica.segment_flushed(SegmentId::new(1));
        assert!(!replica.has_segment(SegmentId::new(1), false));
        assert!(replica.has_segment(SegmentId::new(1), true));
        assert!(replica.list_segments_checkpoints().is_empty());

        replica.update_statistics(SegmentId::new(1), 100);
        replica.refresh_flushed_statistics(SegmentId::new(1), 42);
        assert_eq!(
            replica
                .segment_statistics_updates(SegmentId::new(1))
                .unwrap()
                .num_rows,
            42
        );
    }

    #[tokio::test]
    async fn test_normal_segment_takes_supplied_checkpoint() {
        let replica = replica();
        let mut req = request(SegmentType::Normal, 2, 10);
        req.num_of_rows = 7;
        req.checkpoint = Some(SegmentCheckPoint {
            num_rows: 7,
            position: MsgPosition::new("ch-1", vec![3], 30),
        });
        replica.add_segment(req).await.unwrap();

        replica.update_segment_checkpoint(SegmentId::new(2));
        let cp = &replica.list_segments_checkpoints()[&SegmentId::new(2)];
        assert_eq!((cp.num_rows, cp.position.timestamp), (7, 30));
    }

    #[tokio::test]
    async fn test_memory_size_resets_on_statistics() {
        let replica = replica();
        replica
            .add_segment(request(SegmentType::New, 1, 10))
            .await
            .unwrap();
        replica.add_memory_size(SegmentId::new(1), 512);
        assert_eq!(replica.memory_size(SegmentId::new(1)), Some(512));

        replica.update_statistics(SegmentId::new(1), 3);
        assert_eq!(replica.memory_size(SegmentId::new(1)), Some(0));
    }

    #[tokio::test]
    async fn test_lookups_and_filters() {
        let replica = replica();
        replica
            .add_segment(request(SegmentType::New, 1, 10))
            .await
            .unwrap();
        replica
            .add_segment(request(SegmentType::Normal, 2, 11))
            .await
            .unwrap();
        let mut other = request(SegmentType::Flushed, 3, 10);
        other.channel_name = "ch-2".to_string();
        replica.add_segment(other).await.unwrap();

        assert_eq!(
            replica.list_all_segment_ids(),
            vec![SegmentId::new(1), SegmentId::new(2), SegmentId::new(3)]
        );
        assert_eq!(
            replica.list_partition_segments(PartitionId::new(10)),
            vec![SegmentId::new(1), SegmentId::new(3)]
        );
        assert_eq!(
            replica.filter_segments("ch-1", PartitionId::ALL),
            vec![SegmentId::new(1), SegmentId::new(2)]
        );
        assert_eq!(
            replica.filter_segments("ch-1", PartitionId::new(11)),
            vec![SegmentId::new(2)]
        );
        assert_eq!(
            replica.collection_and_partition_id(SegmentId::new(3)).unwrap(),
            (CollectionId::new(1), PartitionId::new(10))
        );
        assert_eq!(replica.channel_name(SegmentId::new(3)).unwrap(), "ch-2");
        assert!(replica
            .channel_name(SegmentId::new(9))
            .unwrap_err()
            .is_not_found());
        assert!(replica
            .segment_statistics_updates(SegmentId::new(9))
            .unwrap_err()
            .is_not_found());

        replica.remove_segments(&[SegmentId::new(1), SegmentId::new(3), SegmentId::new(9)]);
        assert_eq!(replica.list_all_segment_ids(), vec![SegmentId::new(2)]);
    }

    #[tokio::test]
    async fn test_primary_key_routing() {
        let replica = replica();
        replica
            .add_segment(request(SegmentType::New, 1, 10))
            .await
            .unwrap();
        replica
            .add_segment(request(SegmentType::New, 2, 10))
            .await
            .unwrap();

        replica
            .update_primary_key_range(SegmentId::new(1), &FieldData::Int64(vec![1, 2, 3]))
            .unwrap();
        replica
            .update_primary_key_range(SegmentId::new(2), &FieldData::Int64(vec![100, 200]))
            .unwrap();
        replica
            .update_primary_key_range(SegmentId::new(9), &FieldData::Int64(vec![1]))
            .unwrap();

        let err = replica
            .update_primary_key_range(SegmentId::new(1), &FieldData::Float(vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedPrimaryKey(_)));

        assert_eq!(
            replica.segments_might_contain("ch-1", PartitionId::ALL, &PrimaryKey::Int64(2)),
            vec![SegmentId::new(1)]
        );
        let candidates =
            replica.segments_might_contain("ch-1", PartitionId::new(10), &PrimaryKey::Int64(150));
        assert!(candidates.iter().all(|id| *id == SegmentId::new(2)));
        assert!(replica
            .segments_might_contain("ch-1", PartitionId::ALL, &PrimaryKey::Int64(500))
            .is_empty());
        assert_eq!(
            replica.pk_range(SegmentId::new(2)).unwrap(),
            Some((PrimaryKey::Int64(100), PrimaryKey::Int64(200)))
        );
    }

    #[tokio::test]
    async fn test_foreign_collection_is_rejected() {
        let replica = replica();
        let mut req = request(SegmentType::New, 1, 10);
        req.collection_id = CollectionId::new(2);
        let err = replica.add_segment(req).await.unwrap_err();
        assert!(matches!(err, CoreError::CollectionMismatch { .. }));

        let err = replica
            .collection_schema(CollectionId::new(2), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CollectionMismatch { .. }));
        assert!(replica.list_all_segment_ids().is_empty());
    }
}
