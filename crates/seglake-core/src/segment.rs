use serde::{Deserialize, Serialize};

use crate::ids::{CollectionId, FieldId, PartitionId, SegmentId, Timestamp};

/// Position in a message stream, used as start position and flush checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MsgPosition {
    pub channel_name: String,
    pub msg_id: Vec<u8>,
    pub msg_group: String,
    pub timestamp: Timestamp,
}

impl MsgPosition {
    /// Creates a position on `channel` at `timestamp`.
    #[must_use]
    pub fn new(channel: impl Into<String>, msg_id: Vec<u8>, timestamp: Timestamp) -> Self {
        Self {
            channel_name: channel.into(),
            msg_id,
            msg_group: String::new(),
            timestamp,
        }
    }
}

/// Reference to one persisted log file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binlog {
    pub entries_num: i64,
    pub timestamp_from: Timestamp,
    pub timestamp_to: Timestamp,
    pub log_path: String,
    pub log_size: i64,
}

impl Binlog {
    /// Creates a binlog reference with only path and size filled in.
    #[must_use]
    pub fn with_path(log_path: impl Into<String>, log_size: i64) -> Self {
        Self {
            log_path: log_path.into(),
            log_size,
            ..Self::default()
        }
    }
}

/// Ordered set of log files belonging to one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldBinlog {
    pub field_id: FieldId,
    pub binlogs: Vec<Binlog>,
}

impl FieldBinlog {
    #[must_use]
    pub fn new(field_id: FieldId, binlogs: Vec<Binlog>) -> Self {
        Self { field_id, binlogs }
    }
}

/// Lifecycle state for a segment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SegmentState {
    #[default]
    None,
    NotExist,
    Growing,
    Sealed,
    Flushing,
    Flushed,
    Dropped,
}

impl SegmentState {
    /// Every state, in metric reset order.
    pub const ALL: [SegmentState; 7] = [
        SegmentState::None,
        SegmentState::NotExist,
        SegmentState::Growing,
        SegmentState::Sealed,
        SegmentState::Flushing,
        SegmentState::Flushed,
        SegmentState::Dropped,
    ];

    /// Label used for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::NotExist => "NotExist",
            Self::Growing => "Growing",
            Self::Sealed => "Sealed",
            Self::Flushing => "Flushing",
            Self::Flushed => "Flushed",
            Self::Dropped => "Dropped",
        }
    }

    /// A segment is healthy unless it is dropped or was never created.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        !matches!(self, Self::None | Self::NotExist | Self::Dropped)
    }
}

impl std::fmt::Display for SegmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Persisted segment record owned by the coordinator catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SegmentInfo {
    pub id: SegmentId,
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,
    pub insert_channel: String,
    pub num_of_rows: i64,
    pub state: SegmentState,
    pub max_row_num: i64,
    pub last_expire_time: Timestamp,
    pub start_position: Option<MsgPosition>,
    pub dml_position: Option<MsgPosition>,
    #[serde(default)]
    pub binlogs: Vec<FieldBinlog>,
    #[serde(default)]
    pub statslogs: Vec<FieldBinlog>,
    #[serde(default)]
    pub deltalogs: Vec<FieldBinlog>,
    #[serde(default)]
    pub created_by_compaction: bool,
    #[serde(default)]
    pub compaction_from: Vec<SegmentId>,
    #[serde(default)]
    pub compacted_to: Option<SegmentId>,
    /// Nanoseconds since the Unix epoch, set when the segment is dropped.
    #[serde(default)]
    pub dropped_at: u64,
    #[serde(default)]
    pub is_importing: bool,
}

impl SegmentInfo {
    /// Builds a fresh `Growing` segment record.
    #[must_use]
    pub fn growing(
        id: SegmentId,
        collection_id: CollectionId,
        partition_id: PartitionId,
        insert_channel: impl Into<String>,
        is_importing: bool,
    ) -> Self {
        Self {
            id,
            collection_id,
            partition_id,
            insert_channel: insert_channel.into(),
            state: SegmentState::Growing,
            is_importing,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    /// Sum of the sizes of every binlog, statslog and deltalog.
    #[must_use]
    pub fn log_size(&self) -> i64 {
        crate::binlog::total_log_size(&self.binlogs)
            + crate::binlog::total_log_size(&self.statslogs)
            + crate::binlog::total_log_size(&self.deltalogs)
    }
}

/// Start position reported for a segment when its first data arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentStartPosition {
    pub segment_id: SegmentId,
    pub start_position: Option<MsgPosition>,
}

/// Flush checkpoint reported for a segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckPoint {
    pub segment_id: SegmentId,
    pub position: MsgPosition,
    pub num_of_rows: i64,
}

/// Row-count snapshot for one segment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentStats {
    pub segment_id: SegmentId,
    pub num_rows: i64,
}

/// Files of one compaction source as seen by the compaction executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompactionSegmentBinlogs {
    pub segment_id: SegmentId,
    pub field_binlogs: Vec<FieldBinlog>,
    pub field_statslogs: Vec<FieldBinlog>,
    pub deltalogs: Vec<FieldBinlog>,
    pub insert_channel: String,
}

/// Output of a finished compaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompactionResult {
    pub plan_id: crate::ids::PlanId,
    pub segment_id: SegmentId,
    pub num_of_rows: i64,
    pub insert_logs: Vec<FieldBinlog>,
    pub field_statslogs: Vec<FieldBinlog>,
    pub deltalogs: Vec<FieldBinlog>,
    pub channel: String,
}

/// Opaque key/data pair, used for collection start positions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyDataPair {
    pub key: String,
    pub data: Vec<u8>,
}
