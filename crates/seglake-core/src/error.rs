use thiserror::Error;

use crate::ids::{CollectionId, SegmentId};

/// Canonical error type for segment metadata operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity was not found in the catalog or replica.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"segment"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Request targets a collection other than the one the component is bound to.
    #[error("collection mismatch: expected {expected}, got {actual}")]
    CollectionMismatch {
        /// Collection the component serves.
        expected: CollectionId,
        /// Collection named by the request.
        actual: CollectionId,
    },

    /// One or more compaction sources are unknown, unflushed or already compacted.
    #[error("invalid compaction source segments: {0:?}")]
    InvalidCompactionSource(Vec<SegmentId>),

    /// Two primary-key indexes cannot be merged.
    #[error("incompatible primary key index: {0}")]
    IncompatibleIndex(String),

    /// A primary key of one type was offered to an index of another.
    #[error("primary key type mismatch: index holds {expected}, got {actual}")]
    PrimaryKeyTypeMismatch {
        /// Key type the index was built for.
        expected: &'static str,
        /// Key type offered by the caller.
        actual: &'static str,
    },

    /// Column kind cannot carry primary keys.
    #[error("unsupported primary key field data: {0}")]
    UnsupportedPrimaryKey(&'static str),

    /// Operation violates current state machine rules.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// The backing key-value or blob store rejected the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The governing cancellation token fired before the operation committed.
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Validation error for input data or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },
}

impl CoreError {
    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `Storage` variant.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Returns true for the not-found family of errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CoreError::not_found("segment", SegmentId::new(42));
        assert_eq!(err.to_string(), "segment `42` was not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_json_error_maps_to_deserialization() {
        let err: CoreError = serde_json::from_str::<u64>("{").unwrap_err().into();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }
}
