use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CoreResult;
use crate::ids::{CollectionId, Timestamp};
use crate::schema::CollectionSchema;

/// Transactional key-value store holding the coordinator catalog.
///
/// Every multi-key method is atomic: either all writes and removals become
/// visible or none do.
#[async_trait]
pub trait TxnKv: Send + Sync {
    /// Reads one key, failing with `NotFound` when it is absent.
    async fn load(&self, key: &str) -> CoreResult<Bytes>;

    /// Returns every `(key, value)` whose key starts with `prefix`, ordered by key.
    async fn load_with_prefix(&self, prefix: &str) -> CoreResult<Vec<(String, Bytes)>>;

    async fn save(&self, key: &str, value: Bytes) -> CoreResult<()>;

    /// Writes several keys in one transaction.
    async fn multi_save(&self, kvs: Vec<(String, Bytes)>) -> CoreResult<()>;

    /// Removes a key. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> CoreResult<()>;

    /// Writes `saves` and deletes `removals` in one transaction.
    async fn multi_save_and_remove(
        &self,
        saves: Vec<(String, Bytes)>,
        removals: Vec<String>,
    ) -> CoreResult<()>;
}

/// Object store holding binlog and statslog files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reads every path, returning contents in request order.
    async fn multi_read(&self, paths: &[String]) -> CoreResult<Vec<Bytes>>;

    async fn write(&self, path: &str, data: Bytes) -> CoreResult<()>;
}

/// Source of collection schemas, typically the root coordinator.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Returns the schema of `collection_id` as of `ts` (`0` for latest).
    async fn collection_schema(
        &self,
        collection_id: CollectionId,
        ts: Timestamp,
    ) -> CoreResult<CollectionSchema>;
}
