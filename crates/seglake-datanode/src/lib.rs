//! Data-node view of the segments of one collection.
//!
//! [`SegmentReplica`] tracks every segment a data node writes or has flushed,
//! together with a primary-key membership index per segment that routes deletes
//! to the segments that might hold the key.

pub mod replica;
pub mod segment;

pub use replica::{AddSegmentRequest, CompactedSegment, SegmentReplica};
pub use segment::{Segment, SegmentCheckPoint, SegmentType};
