//! Deterministic failure injection shared by the in-memory stores.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::Mutex;
use seglake_core::CoreError;

/// Outcome injected into the next store call.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Retry-able error, e.g. a leader election or timeout.
    Transient(&'static str),

    /// Non-retry-able error, e.g. a rejected transaction.
    Permanent(&'static str),

    /// Success (no error).
    Ok,
}

impl MockFailure {
    fn to_error(&self) -> Option<CoreError> {
        match self {
            MockFailure::Transient(msg) => Some(CoreError::storage(format!("Transient: {msg}"))),
            MockFailure::Permanent(msg) => Some(CoreError::storage(format!("Permanent: {msg}"))),
            MockFailure::Ok => None,
        }
    }
}

/// Recorded store call.
#[derive(Debug, Clone)]
pub struct CallHistoryEntry {
    /// Operation name, e.g. `"multi_save"` or `"multi_read"`.
    pub operation: &'static str,

    /// Keys or paths touched by the call.
    pub keys: Vec<String>,

    pub success: bool,

    pub timestamp: Instant,
}

/// Failure queue plus call history.
#[derive(Debug, Default)]
pub(crate) struct FailureInjector {
    queue: Mutex<VecDeque<MockFailure>>,
    history: Mutex<Vec<CallHistoryEntry>>,
}

impl FailureInjector {
    pub(crate) fn with_pattern(pattern: Vec<MockFailure>) -> Self {
        Self {
            queue: Mutex::new(pattern.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Random pattern of 100 outcomes failing with probability `failure_rate`.
    pub(crate) fn flaky(failure_rate: f64) -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let pattern = (0..100)
            .map(|_| {
                if rng.gen::<f64>() < failure_rate {
                    MockFailure::Transient("timeout")
                } else {
                    MockFailure::Ok
                }
            })
            .collect();
        Self::with_pattern(pattern)
    }

    pub(crate) fn push(&self, failure: MockFailure) {
        self.queue.lock().push_back(failure);
    }

    /// Pops the next injected outcome; an empty queue means success.
    pub(crate) fn check(&self) -> Option<CoreError> {
        self.queue.lock().pop_front().and_then(|f| f.to_error())
    }

    pub(crate) fn record(&self, operation: &'static str, keys: Vec<String>, success: bool) {
        self.history.lock().push(CallHistoryEntry {
            operation,
            keys,
            success,
            timestamp: Instant::now(),
        });
    }

    pub(crate) fn history(&self) -> Vec<CallHistoryEntry> {
        self.history.lock().clone()
    }

    pub(crate) fn count(&self, operation: &str, success: bool) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|e| e.operation == operation && e.success == success)
            .count()
    }

    pub(crate) fn clear_history(&self) {
        self.history.lock().clear();
    }
}
