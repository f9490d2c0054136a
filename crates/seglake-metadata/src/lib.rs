//! Persisted catalog layout and schema caching for SegLake.
//!
//! [`KvSegmentCatalog`] maps segment records, compaction transaction tags and
//! channel removal markers onto a [`seglake_core::TxnKv`].
//! [`CollectionSchemaCache`] memoizes collection schemas fetched from a
//! [`seglake_core::SchemaProvider`].

pub mod schema_cache;
pub mod segment_catalog;

pub use schema_cache::CollectionSchemaCache;
pub use segment_catalog::{CompactionTxnState, KvSegmentCatalog};
