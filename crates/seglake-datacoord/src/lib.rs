//! Coordinator-side segment catalog.
//!
//! [`SegmentMeta`] is the authoritative record of every segment: state, log file
//! sets, checkpoints and compaction ancestry. Every mutation is persisted through
//! [`seglake_metadata::KvSegmentCatalog`] before the in-memory view is swapped.

pub mod collection;
pub mod compaction;
pub mod meta;
pub mod segments_info;

pub use collection::CollectionInfo;
pub use compaction::CompactionMeta;
pub use meta::{ChanPartSegments, SegmentMeta, UpdateFlushSegmentsRequest};
pub use segments_info::{Allocation, SegmentEntry, SegmentsInfo};
