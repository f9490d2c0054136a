//! In-memory blob store for binlog and statslog files.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use seglake_core::{BlobStore, CoreError, CoreResult};

use crate::failure::{CallHistoryEntry, FailureInjector, MockFailure};

/// [`BlobStore`] keeping files in a map, with failure injection and call history.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Bytes>>,
    failures: FailureInjector,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose next calls follow `pattern`.
    pub fn with_failures(pattern: Vec<MockFailure>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            failures: FailureInjector::with_pattern(pattern),
        }
    }

    pub fn inject(&self, failure: MockFailure) {
        self.failures.push(failure);
    }

    /// Stores `data` at `path` directly, bypassing failure injection.
    pub fn insert(&self, path: impl Into<String>, data: Bytes) {
        self.objects.write().insert(path.into(), data);
    }

    pub fn contains_key(&self, path: &str) -> bool {
        self.objects.read().contains_key(path)
    }

    pub fn get_call_history(&self) -> Vec<CallHistoryEntry> {
        self.failures.history()
    }

    /// Number of `multi_read` calls that succeeded.
    pub fn successful_reads(&self) -> usize {
        self.failures.count("multi_read", true)
    }

    pub fn storage_size(&self) -> usize {
        self.objects.read().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn multi_read(&self, paths: &[String]) -> CoreResult<Vec<Bytes>> {
        if let Some(err) = self.failures.check() {
            self.failures.record("multi_read", paths.to_vec(), false);
            return Err(err);
        }

        let result: CoreResult<Vec<Bytes>> = {
            let objects = self.objects.read();
            paths
                .iter()
                .map(|p| {
                    objects
                        .get(p)
                        .cloned()
                        .ok_or_else(|| CoreError::not_found("blob", p))
                })
                .collect()
        };
        self.failures
            .record("multi_read", paths.to_vec(), result.is_ok());
        result
    }

    async fn write(&self, path: &str, data: Bytes) -> CoreResult<()> {
        if let Some(err) = self.failures.check() {
            self.failures.record("write", vec![path.to_string()], false);
            return Err(err);
        }
        self.objects.write().insert(path.to_string(), data);
        self.failures.record("write", vec![path.to_string()], true);
        Ok(())
    }
}
