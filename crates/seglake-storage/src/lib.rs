//! In-memory implementations of the SegLake storage collaborators.
//!
//! [`MemoryTxnKv`] backs the coordinator catalog and [`MemoryBlobStore`] holds
//! binlog and statslog files. Both accept a deterministic failure pattern so tests
//! can exercise persistence-failure paths.

pub mod blob;
pub mod failure;
pub mod kv;

pub use blob::MemoryBlobStore;
pub use failure::{CallHistoryEntry, MockFailure};
pub use kv::MemoryTxnKv;
