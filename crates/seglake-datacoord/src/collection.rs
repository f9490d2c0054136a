use std::collections::HashMap;

use seglake_core::{CollectionId, CollectionSchema, KeyDataPair, PartitionId};

/// Collection metadata cached by the coordinator. Never persisted by the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionInfo {
    pub id: CollectionId,
    pub schema: Option<CollectionSchema>,
    pub partitions: Vec<PartitionId>,
    pub start_positions: Vec<KeyDataPair>,
    pub properties: HashMap<String, String>,
}

impl CollectionInfo {
    pub fn new(id: CollectionId, schema: Option<CollectionSchema>) -> Self {
        Self {
            id,
            schema,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_partitions(mut self, partitions: Vec<PartitionId>) -> Self {
        self.partitions = partitions;
        self
    }
}
