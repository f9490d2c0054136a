//! Stats-log codec.
//!
//! A stats log is a self-describing JSON document holding the primary-key range and
//! bloom filter of a segment, one per flush. Segments written before stats were
//! compacted may carry several files; they are merged on load.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use seglake_core::{CoreError, CoreResult, FieldId};

use crate::bloom::BloomFilter;
use crate::primary_key::{PkType, PrimaryKey};

/// Persisted form of a [`crate::PrimaryKeyIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyStats {
    pub field_id: FieldId,
    pub pk_type: PkType,
    pub min_pk: Option<PrimaryKey>,
    pub max_pk: Option<PrimaryKey>,
    pub bloom: BloomFilter,
}

/// Encodes one stats record.
pub fn serialize_stats(stats: &PrimaryKeyStats) -> CoreResult<Bytes> {
    let encoded = serde_json::to_vec(stats)
        .map_err(|e| CoreError::Serialization(format!("primary key stats: {e}")))?;
    Ok(Bytes::from(encoded))
}

/// Decodes every blob, failing on the first malformed one.
pub fn deserialize_stats(blobs: &[Bytes]) -> CoreResult<Vec<PrimaryKeyStats>> {
    let mut decoded = Vec::with_capacity(blobs.len());
    for (idx, blob) in blobs.iter().enumerate() {
        let stats: PrimaryKeyStats = serde_json::from_slice(blob)
            .map_err(|e| CoreError::Deserialization(format!("stats blob {idx}: {e}")))?;
        decoded.push(stats);
    }
    debug!(count = decoded.len(), "decoded primary key stats");
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrimaryKeyIndex;

    #[test]
    fn test_bits_survive_encoding() {
        let mut index = PrimaryKeyIndex::build(FieldId::new(100), PkType::Int64, 500, 0.005);
        for pk in 0..500 {
            index.add(&PrimaryKey::Int64(pk * 3)).unwrap();
        }
        let stats = index.to_stats(FieldId::new(100), PkType::Int64).unwrap();

        let blob = serialize_stats(&stats).unwrap();
        let decoded = deserialize_stats(&[blob]).unwrap();
        assert_eq!(decoded, vec![stats]);

        let rebuilt = PrimaryKeyIndex::from_stats(decoded.into_iter().next().unwrap()).unwrap();
        assert_eq!(rebuilt, index);
    }

    #[test]
    fn test_garbage_blob_is_rejected() {
        let err = deserialize_stats(&[Bytes::from_static(b"not json")]).unwrap_err();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }

    #[test]
    fn test_bound_type_must_match() {
        let index = PrimaryKeyIndex::build(FieldId::new(100), PkType::Int64, 10, 0.005);
        let mut stats = index.to_stats(FieldId::new(100), PkType::Int64).unwrap();
        stats.min_pk = Some(PrimaryKey::from("oops"));
        assert!(matches!(
            PrimaryKeyIndex::from_stats(stats),
            Err(CoreError::Deserialization(_))
        ));
    }
}
