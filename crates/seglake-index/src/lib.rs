//! Primary-key membership index for SegLake segments.
//!
//! Each segment carries a [`PrimaryKeyIndex`]: a bloom filter over the primary keys
//! it holds plus the exact key range. Delete routing consults it to skip segments
//! that cannot hold a key, and the stats-log codec persists it next to binlogs.

pub mod bloom;
pub mod pk_index;
pub mod primary_key;
pub mod stats;

pub use bloom::BloomFilter;
pub use pk_index::PrimaryKeyIndex;
pub use primary_key::{PkType, PrimaryKey};
pub use stats::{deserialize_stats, serialize_stats, PrimaryKeyStats};

/// False-positive rate used when none is configured.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.005;
