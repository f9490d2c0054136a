use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use seglake_core::{
    with_cancellation, CollectionId, CollectionSchema, CoreResult, FieldSchema, SchemaProvider,
    Timestamp,
};

/// Read-through cache of collection schemas.
///
/// A hit only takes the read lock. A miss takes the write lock, checks again and
/// fetches from the provider, so concurrent misses for one collection cost a
/// single fetch.
pub struct CollectionSchemaCache {
    provider: Arc<dyn SchemaProvider>,
    schemas: RwLock<HashMap<CollectionId, Arc<CollectionSchema>>>,
    cancel: CancellationToken,
}

impl CollectionSchemaCache {
    pub fn new(provider: Arc<dyn SchemaProvider>, cancel: CancellationToken) -> Self {
        Self {
            provider,
            schemas: RwLock::new(HashMap::new()),
            cancel,
        }
    }

    /// Returns the schema of `collection_id`, fetching it as of `ts` on a miss.
    ///
    /// `ts = 0` asks the provider for the latest schema. A cached schema is
    /// returned regardless of `ts`.
    pub async fn get(
        &self,
        collection_id: CollectionId,
        ts: Timestamp,
    ) -> CoreResult<Arc<CollectionSchema>> {
        {
            let schemas = self.schemas.read().await;
            if let Some(schema) = schemas.get(&collection_id) {
                return Ok(Arc::clone(schema));
            }
        }

        let mut schemas = self.schemas.write().await;
        if let Some(schema) = schemas.get(&collection_id) {
            return Ok(Arc::clone(schema));
        }

        let schema = with_cancellation(
            &self.cancel,
            self.provider.collection_schema(collection_id, ts),
        )
        .await
        .map_err(|e| {
            tracing::warn!(
                collection_id = %collection_id,
                error = %e,
                "failed to fetch collection schema"
            );
            e
        })?;

        tracing::debug!(
            collection_id = %collection_id,
            fields = schema.fields.len(),
            "cached collection schema"
        );
        let schema = Arc::new(schema);
        schemas.insert(collection_id, Arc::clone(&schema));
        Ok(schema)
    }

    /// Seeds or replaces the cached schema of a collection.
    pub async fn insert(&self, collection_id: CollectionId, schema: CollectionSchema) {
        self.schemas
            .write()
            .await
            .insert(collection_id, Arc::new(schema));
    }

    /// Drops the cached schema; the next `get` fetches again.
    pub async fn invalidate(&self, collection_id: CollectionId) -> bool {
        self.schemas.write().await.remove(&collection_id).is_some()
    }

    /// Primary-key field of the latest schema.
    pub async fn primary_key_field(&self, collection_id: CollectionId) -> CoreResult<FieldSchema> {
        let schema = self.get(collection_id, 0).await?;
        schema.primary_key_field().cloned()
    }
}
