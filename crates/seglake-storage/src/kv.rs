//! In-memory transactional key-value store.
//!
//! Simulates an etcd-style store: ordered keys, atomic multi-key transactions with
//! an upper bound on operations per transaction, and injectable failures.
//!
//! ```rust
//! use bytes::Bytes;
//! use seglake_core::TxnKv;
//! use seglake_storage::{MemoryTxnKv, MockFailure};
//!
//! # async fn example() -> seglake_core::CoreResult<()> {
//! let kv = MemoryTxnKv::with_failures(vec![MockFailure::Transient("leader changed")]);
//! assert!(kv.save("a", Bytes::from("1")).await.is_err());
//! kv.save("a", Bytes::from("1")).await?;
//! assert_eq!(kv.load("a").await?, Bytes::from("1"));
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use seglake_core::{CoreError, CoreResult, TxnKv};
use tracing::debug;

use crate::failure::{CallHistoryEntry, FailureInjector, MockFailure};

/// Ordered in-memory [`TxnKv`].
#[derive(Debug)]
pub struct MemoryTxnKv {
    data: RwLock<BTreeMap<String, Bytes>>,
    max_txn_ops: usize,
    failures: FailureInjector,
}

impl MemoryTxnKv {
    /// Creates an empty store without a transaction size limit.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            max_txn_ops: usize::MAX,
            failures: FailureInjector::default(),
        }
    }

    /// Creates a store rejecting transactions larger than `max_txn_ops`.
    pub fn with_max_txn_ops(max_txn_ops: usize) -> Self {
        Self {
            max_txn_ops,
            ..Self::new()
        }
    }

    /// Creates a store whose next calls follow `pattern`.
    ///
    /// Outcomes are consumed in order; once the queue is empty every call succeeds.
    pub fn with_failures(pattern: Vec<MockFailure>) -> Self {
        Self {
            failures: FailureInjector::with_pattern(pattern),
            ..Self::new()
        }
    }

    /// Creates a store that fails at random with probability `failure_rate`.
    pub fn new_flaky(failure_rate: f64) -> Self {
        Self {
            failures: FailureInjector::flaky(failure_rate),
            ..Self::new()
        }
    }

    /// Queues an outcome for a future call.
    pub fn inject(&self, failure: MockFailure) {
        self.failures.push(failure);
    }

    pub fn get_call_history(&self) -> Vec<CallHistoryEntry> {
        self.failures.history()
    }

    pub fn clear_history(&self) {
        self.failures.clear_history();
    }

    /// Number of calls of `operation` that succeeded.
    pub fn successful_calls(&self, operation: &str) -> usize {
        self.failures.count(operation, true)
    }

    /// Number of calls of `operation` that failed.
    pub fn failed_calls(&self, operation: &str) -> usize {
        self.failures.count(operation, false)
    }

    /// Raw value of `key`, bypassing failure injection.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.data.read().get(key).cloned()
    }

    /// Keys starting with `prefix`, bypassing failure injection.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.data
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn guard(&self, operation: &'static str, keys: &[String]) -> CoreResult<()> {
        if let Some(err) = self.failures.check() {
            self.failures.record(operation, keys.to_vec(), false);
            return Err(err);
        }
        Ok(())
    }

    fn commit(
        &self,
        operation: &'static str,
        saves: Vec<(String, Bytes)>,
        removals: Vec<String>,
    ) -> CoreResult<()> {
        let mut keys: Vec<String> = saves.iter().map(|(k, _)| k.clone()).collect();
        keys.extend(removals.iter().cloned());

        self.guard(operation, &keys)?;

        if keys.len() > self.max_txn_ops {
            self.failures.record(operation, keys.clone(), false);
            return Err(CoreError::storage(format!(
                "transaction has {} operations, limit is {}",
                keys.len(),
                self.max_txn_ops
            )));
        }

        {
            let mut data = self.data.write();
            for (key, value) in saves {
                data.insert(key, value);
            }
            for key in &removals {
                data.remove(key);
            }
        }

        debug!(operation, ops = keys.len(), "kv transaction committed");
        self.failures.record(operation, keys, true);
        Ok(())
    }
}

impl Default for MemoryTxnKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TxnKv for MemoryTxnKv {
    async fn load(&self, key: &str) -> CoreResult<Bytes> {
        self.guard("load", &[key.to_string()])?;
        let value = self.data.read().get(key).cloned();
        match value {
            Some(v) => {
                self.failures.record("load", vec![key.to_string()], true);
                Ok(v)
            }
            None => {
                self.failures.record("load", vec![key.to_string()], false);
                Err(CoreError::not_found("key", key))
            }
        }
    }

    async fn load_with_prefix(&self, prefix: &str) -> CoreResult<Vec<(String, Bytes)>> {
        self.guard("load_with_prefix", &[prefix.to_string()])?;
        let entries: Vec<(String, Bytes)> = self
            .data
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.failures
            .record("load_with_prefix", vec![prefix.to_string()], true);
        Ok(entries)
    }

    async fn save(&self, key: &str, value: Bytes) -> CoreResult<()> {
        self.commit("save", vec![(key.to_string(), value)], Vec::new())
    }

    async fn multi_save(&self, kvs: Vec<(String, Bytes)>) -> CoreResult<()> {
        self.commit("multi_save", kvs, Vec::new())
    }

    async fn remove(&self, key: &str) -> CoreResult<()> {
        self.commit("remove", Vec::new(), vec![key.to_string()])
    }

    async fn multi_save_and_remove(
        &self,
        saves: Vec<(String, Bytes)>,
        removals: Vec<String>,
    ) -> CoreResult<()> {
        self.commit("multi_save_and_remove", saves, removals)
    }
}
