use std::fmt;

use serde::{Deserialize, Serialize};

use seglake_core::{CoreError, CoreResult, DataType};

/// Type of a collection primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkType {
    Int64,
    VarChar,
}

impl PkType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Int64 => "Int64",
            Self::VarChar => "VarChar",
        }
    }

    /// Maps a schema data type to a key type.
    pub fn from_data_type(data_type: DataType) -> CoreResult<Self> {
        match data_type {
            DataType::Int64 => Ok(Self::Int64),
            DataType::VarChar => Ok(Self::VarChar),
            other => Err(CoreError::UnsupportedPrimaryKey(other.as_str())),
        }
    }
}

impl fmt::Display for PkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single primary-key value.
///
/// Keys of the same type compare by value; an index never mixes types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PrimaryKey {
    Int64(i64),
    VarChar(String),
}

impl PrimaryKey {
    #[must_use]
    pub fn pk_type(&self) -> PkType {
        match self {
            Self::Int64(_) => PkType::Int64,
            Self::VarChar(_) => PkType::VarChar,
        }
    }

    /// Bytes fed to the bloom filter: little-endian for integers, UTF-8 for strings.
    pub(crate) fn with_hash_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match self {
            Self::Int64(v) => f(&v.to_le_bytes()),
            Self::VarChar(s) => f(s.as_bytes()),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::VarChar(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::VarChar(value)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::VarChar(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        assert_eq!(PkType::from_data_type(DataType::Int64).unwrap(), PkType::Int64);
        assert_eq!(
            PkType::from_data_type(DataType::VarChar).unwrap(),
            PkType::VarChar
        );
        assert!(matches!(
            PkType::from_data_type(DataType::FloatVector),
            Err(CoreError::UnsupportedPrimaryKey("FloatVector"))
        ));
    }

    #[test]
    fn test_ordering_within_type() {
        assert!(PrimaryKey::Int64(-5) < PrimaryKey::Int64(3));
        assert!(PrimaryKey::from("apple") < PrimaryKey::from("banana"));
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&PrimaryKey::Int64(42)).unwrap();
        assert_eq!(json, r#"{"type":"Int64","value":42}"#);
    }
}
