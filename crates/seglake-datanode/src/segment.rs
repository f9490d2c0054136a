use bytes::Bytes;

use seglake_core::{
    CollectionId, CoreResult, FieldData, FieldId, MsgPosition, PartitionId, SegmentId,
};
use seglake_index::{serialize_stats, PkType, PrimaryKey, PrimaryKeyIndex};

/// Lifecycle bucket of a segment on the data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentType {
    /// Created on this node; its start position has not been reported yet.
    New,
    /// Receiving inserts, start position already reported.
    Normal,
    /// Sealed and persisted. Terminal.
    Flushed,
}

impl SegmentType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SegmentType::New => "new",
            SegmentType::Normal => "normal",
            SegmentType::Flushed => "flushed",
        }
    }

    /// New and Normal segments count as unflushed.
    pub const fn is_unflushed(&self) -> bool {
        matches!(self, SegmentType::New | SegmentType::Normal)
    }
}

impl std::fmt::Display for SegmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows durably written up to `position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCheckPoint {
    pub num_rows: i64,
    pub position: MsgPosition,
}

/// One segment held by a [`crate::SegmentReplica`].
#[derive(Debug, Clone)]
pub struct Segment {
    pub(crate) collection_id: CollectionId,
    pub(crate) partition_id: PartitionId,
    pub(crate) segment_id: SegmentId,
    pub(crate) channel_name: String,
    pub(crate) num_rows: i64,
    pub(crate) memory_size: i64,
    pub(crate) compacted_to: Option<SegmentId>,
    pub(crate) checkpoint: Option<SegmentCheckPoint>,
    pub(crate) start_pos: Option<MsgPosition>,
    pub(crate) end_pos: Option<MsgPosition>,
    pub(crate) pk_index: PrimaryKeyIndex,
}

impl Segment {
    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn num_rows(&self) -> i64 {
        self.num_rows
    }

    pub fn compacted_to(&self) -> Option<SegmentId> {
        self.compacted_to
    }

    pub fn pk_index(&self) -> &PrimaryKeyIndex {
        &self.pk_index
    }

    /// Adds every key of an insert batch to the index.
    pub fn update_pk_range(&mut self, ids: &FieldData) -> CoreResult<()> {
        self.pk_index.add_field_data(ids)
    }

    pub fn might_contain(&self, pk: &PrimaryKey) -> bool {
        self.pk_index.might_contain(pk)
    }

    /// Checkpoint covering every row seen so far, if an end position is known.
    pub(crate) fn advance_checkpoint(&mut self) -> bool {
        match &self.end_pos {
            Some(end) => {
                self.checkpoint = Some(SegmentCheckPoint {
                    num_rows: self.num_rows,
                    position: end.clone(),
                });
                true
            }
            None => false,
        }
    }

    /// Encodes the index as a stats log labelled with the schema's key field.
    pub fn statslog(&self, pk_field: FieldId, pk_type: PkType) -> CoreResult<Bytes> {
        serialize_stats(&self.pk_index.to_stats(pk_field, pk_type)?)
    }

    pub(crate) fn matches(&self, channel: &str, partition_id: PartitionId) -> bool {
        self.channel_name == channel
            && (partition_id.is_all() || self.partition_id == partition_id)
    }
}
