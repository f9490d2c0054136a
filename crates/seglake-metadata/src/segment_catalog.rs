//! Persisted layout of coordinator segment metadata.
//!
//! Keys, relative to the configured root:
//!
//! | key | value |
//! |---|---|
//! | `s/{collection}/{partition}/{segment}` | JSON [`SegmentInfo`] |
//! | `channel-removal/{channel}` | `removed` |
//! | `compaction-txn/{segment}` | JSON [`CompactionTxnState`] |
//!
//! Multi-key writes go through a single KV transaction so a crash never leaves half
//! of a flush or compaction visible.
//!
//! A `Committed` tag is removed together with the segment it names. `Reverted` tags
//! are kept so a late forward retry of that compaction keeps failing.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use seglake_core::{CoreError, CoreResult, DataCoordConfig, SegmentId, SegmentInfo, TxnKv};

const SEGMENT_PREFIX: &str = "s";
const CHANNEL_REMOVAL_PREFIX: &str = "channel-removal";
const COMPACTION_TXN_PREFIX: &str = "compaction-txn";
const REMOVED_FLAG: &[u8] = b"removed";

/// Outcome recorded for a compaction, keyed by the segment it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompactionTxnState {
    Committed,
    Reverted,
}

/// Segment catalog stored in a transactional KV.
#[derive(Clone)]
pub struct KvSegmentCatalog {
    kv: Arc<dyn TxnKv>,
    root: String,
    max_txn_ops: usize,
}

impl std::fmt::Debug for KvSegmentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvSegmentCatalog")
            .field("root", &self.root)
            .field("max_txn_ops", &self.max_txn_ops)
            .finish()
    }
}

impl KvSegmentCatalog {
    pub fn new(kv: Arc<dyn TxnKv>, config: &DataCoordConfig) -> Self {
        Self {
            kv,
            root: config.kv_root_path.trim_end_matches('/').to_string(),
            max_txn_ops: config.max_txn_ops.max(2),
        }
    }

    /// Key under which `segment` is stored.
    pub fn segment_key(&self, segment: &SegmentInfo) -> String {
        format!(
            "{}/{SEGMENT_PREFIX}/{}/{}/{}",
            self.root, segment.collection_id, segment.partition_id, segment.id
        )
    }

    fn segment_entry(&self, segment: &SegmentInfo) -> CoreResult<(String, Bytes)> {
        Ok((self.segment_key(segment), encode_segment(segment)?))
    }

    pub fn channel_removal_key(&self, channel: &str) -> String {
        format!("{}/{CHANNEL_REMOVAL_PREFIX}/{channel}", self.root)
    }

    pub fn compaction_txn_key(&self, new_segment_id: SegmentId) -> String {
        format!("{}/{COMPACTION_TXN_PREFIX}/{new_segment_id}", self.root)
    }

    /// Loads every persisted segment record.
    pub async fn list_segments(&self) -> CoreResult<Vec<SegmentInfo>> {
        let prefix = format!("{}/{SEGMENT_PREFIX}/", self.root);
        let entries = self.kv.load_with_prefix(&prefix).await?;

        let mut segments = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let segment: SegmentInfo = serde_json::from_slice(&value).map_err(|e| {
                CoreError::Deserialization(format!("segment record `{key}`: {e}"))
            })?;
            segments.push(segment);
        }
        Ok(segments)
    }

    pub async fn add_segment(&self, segment: &SegmentInfo) -> CoreResult<()> {
        self.kv
            .save(&self.segment_key(segment), encode_segment(segment)?)
            .await
    }

    /// Writes every record in one transaction.
    pub async fn alter_segments(&self, segments: &[SegmentInfo]) -> CoreResult<()> {
        if segments.is_empty() {
            return Ok(());
        }
        let kvs = segments
            .iter()
            .map(|s| self.segment_entry(s))
            .collect::<CoreResult<Vec<_>>>()?;
        self.kv.multi_save(kvs).await
    }

    /// Removes the record. A segment produced by compaction takes its `Committed`
    /// tag with it in the same transaction.
    pub async fn drop_segment(&self, segment: &SegmentInfo) -> CoreResult<()> {
        if !segment.created_by_compaction {
            return self.kv.remove(&self.segment_key(segment)).await;
        }
        self.kv
            .multi_save_and_remove(
                Vec::new(),
                vec![self.segment_key(segment), self.compaction_txn_key(segment.id)],
            )
            .await
    }

    /// Reads the compaction tag written for `new_segment_id`, if any.
    pub async fn compaction_txn_state(
        &self,
        new_segment_id: SegmentId,
    ) -> CoreResult<Option<CompactionTxnState>> {
        match self.kv.load(&self.compaction_txn_key(new_segment_id)).await {
            Ok(value) => Ok(Some(serde_json::from_slice(&value)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Forward step of the compaction saga.
    ///
    /// Writes the modified sources, the new segment (only if it holds rows) and a
    /// `Committed` tag in one transaction. Repeating a committed step is a no-op;
    /// committing a reverted compaction fails with `InvalidState`.
    pub async fn alter_segments_and_add_new_segment(
        &self,
        modified: &[SegmentInfo],
        new_segment: &SegmentInfo,
    ) -> CoreResult<()> {
        match self.compaction_txn_state(new_segment.id).await? {
            Some(CompactionTxnState::Committed) => {
                tracing::debug!(
                    segment_id = %new_segment.id,
                    "compaction already committed, skipping"
                );
                return Ok(());
            }
            Some(CompactionTxnState::Reverted) => {
                return Err(CoreError::invalid_state(format!(
                    "compaction producing segment {} was already reverted",
                    new_segment.id
                )));
            }
            None => {}
        }

        let mut kvs = Vec::with_capacity(modified.len() + 2);
        for segment in modified {
            kvs.push(self.segment_entry(segment)?);
        }
        if new_segment.num_of_rows > 0 {
            kvs.push(self.segment_entry(new_segment)?);
        }
        kvs.push((
            self.compaction_txn_key(new_segment.id),
            encode_txn_state(CompactionTxnState::Committed)?,
        ));
        self.kv.multi_save(kvs).await
    }

    /// Compensating step of the compaction saga.
    ///
    /// Restores the original source records, removes the new segment and tags the
    /// compaction `Reverted`. Repeating a revert is a no-op.
    pub async fn revert_alter_segments_and_add_new_segment(
        &self,
        old_segments: &[SegmentInfo],
        new_segment: &SegmentInfo,
    ) -> CoreResult<()> {
        if self.compaction_txn_state(new_segment.id).await? == Some(CompactionTxnState::Reverted) {
            tracing::debug!(
                segment_id = %new_segment.id,
                "compaction already reverted, skipping"
            );
            return Ok(());
        }

        let mut saves = Vec::with_capacity(old_segments.len() + 1);
        for segment in old_segments {
            saves.push(self.segment_entry(segment)?);
        }
        saves.push((
            self.compaction_txn_key(new_segment.id),
            encode_txn_state(CompactionTxnState::Reverted)?,
        ));
        self.kv
            .multi_save_and_remove(saves, vec![self.segment_key(new_segment)])
            .await
    }

    /// Persists dropped segments of `channel` and marks the channel removed.
    ///
    /// Writes are split into transactions of at most `max_txn_ops` keys. The removal
    /// marker rides in the final transaction together with at least one segment, so
    /// a crash part-way leaves the channel unmarked and the drop can be retried.
    pub async fn save_dropped_segments_and_mark_channel(
        &self,
        channel: &str,
        segments: &[SegmentInfo],
    ) -> CoreResult<()> {
        let tail_len = segments.len().min(self.max_txn_ops - 1);
        let (head, tail) = segments.split_at(segments.len() - tail_len);

        for chunk in head.chunks(self.max_txn_ops) {
            let kvs = chunk
                .iter()
                .map(|s| self.segment_entry(s))
                .collect::<CoreResult<Vec<_>>>()?;
            self.kv.multi_save(kvs).await?;
        }

        let mut last = tail
            .iter()
            .map(|s| self.segment_entry(s))
            .collect::<CoreResult<Vec<_>>>()?;
        last.push((
            self.channel_removal_key(channel),
            Bytes::from_static(REMOVED_FLAG),
        ));
        self.kv.multi_save(last).await?;

        tracing::info!(
            channel,
            segments = segments.len(),
            "persisted dropped segments and marked channel removed"
        );
        Ok(())
    }

    pub async fn is_channel_deleted(&self, channel: &str) -> CoreResult<bool> {
        match self.kv.load(&self.channel_removal_key(channel)).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

fn encode_segment(segment: &SegmentInfo) -> CoreResult<Bytes> {
    serde_json::to_vec(segment)
        .map(Bytes::from)
        .map_err(|e| CoreError::Serialization(format!("segment {}: {e}", segment.id)))
}

fn encode_txn_state(state: CompactionTxnState) -> CoreResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(&state)?))
}
