use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use seglake_core::{SegmentId, SegmentInfo, SegmentState, Timestamp};

/// Rows reserved on a segment for one writer until `expire_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub segment_id: SegmentId,
    pub num_of_rows: i64,
    pub expire_time: Timestamp,
}

impl Allocation {
    pub fn new(segment_id: SegmentId, num_of_rows: i64, expire_time: Timestamp) -> Self {
        Self {
            segment_id,
            num_of_rows,
            expire_time,
        }
    }
}

/// Coordinator view of one segment: the persisted record plus bookkeeping that
/// never reaches the KV store.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    pub info: SegmentInfo,
    /// Rows buffered on the data node but not yet reported in a checkpoint.
    pub current_rows: i64,
    pub last_flush_time: Option<DateTime<Utc>>,
    pub is_compacting: bool,
    /// Outstanding row reservations. Only `last_expire_time` reaches the store.
    pub allocations: Vec<Allocation>,
}

impl SegmentEntry {
    pub fn new(info: SegmentInfo) -> Self {
        Self {
            info,
            current_rows: 0,
            last_flush_time: None,
            is_compacting: false,
            allocations: Vec::new(),
        }
    }

    /// Records a reservation and moves the expiry watermark to it.
    pub fn push_allocation(&mut self, allocation: Allocation) {
        self.info.last_expire_time = allocation.expire_time;
        self.allocations.push(allocation);
    }

    /// Rows reserved by outstanding allocations.
    pub fn allocated_rows(&self) -> i64 {
        self.allocations.iter().map(|a| a.num_of_rows).sum()
    }

    #[must_use]
    pub fn with_current_rows(mut self, rows: i64) -> Self {
        self.current_rows = rows;
        self
    }

    pub fn id(&self) -> SegmentId {
        self.info.id
    }

    pub fn state(&self) -> SegmentState {
        self.info.state
    }

    pub fn is_healthy(&self) -> bool {
        self.info.is_healthy()
    }
}

impl From<SegmentInfo> for SegmentEntry {
    fn from(info: SegmentInfo) -> Self {
        Self::new(info)
    }
}

/// Published segment entries keyed by id.
///
/// Entries are shared as `Arc` snapshots and never mutated in place: every update
/// clones the entry, edits the copy and swaps it in.
#[derive(Debug, Default, Clone)]
pub struct SegmentsInfo {
    segments: BTreeMap<SegmentId, Arc<SegmentEntry>>,
}

impl SegmentsInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SegmentId) -> Option<Arc<SegmentEntry>> {
        self.segments.get(&id).cloned()
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.segments.contains_key(&id)
    }

    /// Publishes `entry`, replacing any previous version.
    pub fn set(&mut self, entry: SegmentEntry) {
        self.segments.insert(entry.id(), Arc::new(entry));
    }

    pub fn remove(&mut self, id: SegmentId) -> Option<Arc<SegmentEntry>> {
        self.segments.remove(&id)
    }

    /// Snapshots in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SegmentEntry>> {
        self.segments.values()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Applies `f` to a copy of the entry and publishes the copy.
    ///
    /// Returns false when `id` is unknown.
    pub fn update(&mut self, id: SegmentId, f: impl FnOnce(&mut SegmentEntry)) -> bool {
        match self.segments.get_mut(&id) {
            Some(slot) => {
                let mut next = SegmentEntry::clone(slot);
                f(&mut next);
                *slot = Arc::new(next);
                true
            }
            None => false,
        }
    }

    pub fn set_state(&mut self, id: SegmentId, state: SegmentState) -> bool {
        self.update(id, |e| e.info.state = state)
    }

    pub fn set_is_importing(&mut self, id: SegmentId, importing: bool) -> bool {
        self.update(id, |e| e.info.is_importing = importing)
    }

    pub fn set_current_rows(&mut self, id: SegmentId, rows: i64) -> bool {
        self.update(id, |e| e.current_rows = rows)
    }

    pub fn set_flush_time(&mut self, id: SegmentId, at: DateTime<Utc>) -> bool {
        self.update(id, |e| e.last_flush_time = Some(at))
    }

    pub fn set_is_compacting(&mut self, id: SegmentId, compacting: bool) -> bool {
        self.update(id, |e| e.is_compacting = compacting)
    }

    pub fn add_allocation(&mut self, id: SegmentId, allocation: Allocation) -> bool {
        self.update(id, |e| e.push_allocation(allocation))
    }

    /// Replaces every allocation of the segment.
    pub fn set_allocations(&mut self, id: SegmentId, allocations: Vec<Allocation>) -> bool {
        self.update(id, |e| e.allocations = allocations)
    }
}
