//! Metadata produced when a merge compaction completes.

use std::sync::Arc;

use seglake_core::binlog::{subtract_binlogs, update_binlogs};
use seglake_core::{
    CompactionResult, CompactionSegmentBinlogs, CoreError, CoreResult, FieldBinlog, MsgPosition,
    SegmentInfo, SegmentState,
};

use crate::segments_info::SegmentEntry;

/// Everything needed to commit, or roll back, one compaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionMeta {
    /// Source records exactly as they were before the compaction, for revert.
    pub old_segments: Vec<SegmentInfo>,
    /// Source records marked `Dropped` and pointed at the new segment.
    pub modified_sources: Vec<SegmentEntry>,
    /// Segment produced by the compaction, in `Flushing` state.
    pub new_segment: SegmentEntry,
}

/// Builds the compaction outcome from the current source entries.
///
/// `sources` must be non-empty and follow the order of `source_logs`. Delta logs
/// written to a source while it was being compacted, and not folded into the
/// result, are carried over to the new segment.
pub(crate) fn build_compaction_meta(
    sources: &[Arc<SegmentEntry>],
    source_logs: &[CompactionSegmentBinlogs],
    result: &CompactionResult,
    dropped_at: u64,
) -> CoreResult<CompactionMeta> {
    let Some(first) = sources.first() else {
        return Err(CoreError::InvalidCompactionSource(Vec::new()));
    };

    let old_segments: Vec<SegmentInfo> = sources.iter().map(|s| s.info.clone()).collect();

    let modified_sources: Vec<SegmentEntry> = sources
        .iter()
        .map(|s| {
            let mut cloned = SegmentEntry::clone(s);
            cloned.info.state = SegmentState::Dropped;
            cloned.info.dropped_at = dropped_at;
            cloned.info.compacted_to = Some(result.segment_id);
            cloned
        })
        .collect();

    let start_position = earliest(sources.iter().map(|s| s.info.start_position.as_ref()));
    let dml_position = earliest(sources.iter().map(|s| s.info.dml_position.as_ref()));

    let origin_deltalogs: Vec<FieldBinlog> = sources
        .iter()
        .flat_map(|s| s.info.deltalogs.iter().cloned())
        .collect();
    let folded_deltalogs: Vec<FieldBinlog> = source_logs
        .iter()
        .flat_map(|l| l.deltalogs.iter().cloned())
        .collect();
    let carried = subtract_binlogs(&origin_deltalogs, &folded_deltalogs);
    let deltalogs = update_binlogs(&result.deltalogs, &[], &carried);

    let new_info = SegmentInfo {
        id: result.segment_id,
        collection_id: first.info.collection_id,
        partition_id: first.info.partition_id,
        insert_channel: first.info.insert_channel.clone(),
        num_of_rows: result.num_of_rows,
        state: SegmentState::Flushing,
        max_row_num: first.info.max_row_num,
        binlogs: result.insert_logs.clone(),
        statslogs: result.field_statslogs.clone(),
        deltalogs,
        start_position,
        dml_position,
        created_by_compaction: true,
        compaction_from: sources.iter().map(|s| s.id()).collect(),
        ..SegmentInfo::default()
    };

    Ok(CompactionMeta {
        old_segments,
        modified_sources,
        new_segment: SegmentEntry::new(new_info),
    })
}

fn earliest<'a>(positions: impl Iterator<Item = Option<&'a MsgPosition>>) -> Option<MsgPosition> {
    positions.flatten().min_by_key(|p| p.timestamp).cloned()
}
