use seglake_core::{CoreError, CoreResult, FieldData, FieldId};

use crate::bloom::BloomFilter;
use crate::primary_key::{PkType, PrimaryKey};
use crate::stats::PrimaryKeyStats;

/// Membership index over the primary keys of one segment.
///
/// Answers "might this segment hold key `k`?" with no false negatives. The exact
/// `[min_pk, max_pk]` range is checked before the bloom filter.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKeyIndex {
    field_id: FieldId,
    pk_type: PkType,
    min_pk: Option<PrimaryKey>,
    max_pk: Option<PrimaryKey>,
    bloom: BloomFilter,
}

impl PrimaryKeyIndex {
    /// Allocates an empty index sized for `estimated_rows` keys.
    ///
    /// Non-positive estimates are clamped to the smallest viable filter.
    pub fn build(
        field_id: FieldId,
        pk_type: PkType,
        estimated_rows: i64,
        false_positive_rate: f64,
    ) -> Self {
        let capacity = usize::try_from(estimated_rows.max(1)).unwrap_or(usize::MAX);
        Self {
            field_id,
            pk_type,
            min_pk: None,
            max_pk: None,
            bloom: BloomFilter::new(capacity, false_positive_rate),
        }
    }

    pub fn field_id(&self) -> FieldId {
        self.field_id
    }

    pub fn pk_type(&self) -> PkType {
        self.pk_type
    }

    pub fn min_pk(&self) -> Option<&PrimaryKey> {
        self.min_pk.as_ref()
    }

    pub fn max_pk(&self) -> Option<&PrimaryKey> {
        self.max_pk.as_ref()
    }

    pub fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }

    /// True until the first key is added.
    pub fn is_empty(&self) -> bool {
        self.min_pk.is_none()
    }

    /// Records one key.
    pub fn add(&mut self, pk: &PrimaryKey) -> CoreResult<()> {
        self.check_type(pk.pk_type())?;
        self.insert_unchecked(pk);
        Ok(())
    }

    /// Records every value of a primary-key column.
    ///
    /// Only `Int64` and `VarChar` columns are accepted; the index is left untouched
    /// on error.
    pub fn add_field_data(&mut self, data: &FieldData) -> CoreResult<()> {
        match data {
            FieldData::Int64(values) => {
                self.check_type(PkType::Int64)?;
                for v in values {
                    self.insert_unchecked(&PrimaryKey::Int64(*v));
                }
            }
            FieldData::VarChar(values) => {
                self.check_type(PkType::VarChar)?;
                for v in values {
                    self.insert_unchecked(&PrimaryKey::VarChar(v.clone()));
                }
            }
            other => return Err(CoreError::UnsupportedPrimaryKey(other.kind())),
        }
        Ok(())
    }

    /// Returns false only if `pk` was certainly never added.
    pub fn might_contain(&self, pk: &PrimaryKey) -> bool {
        if pk.pk_type() != self.pk_type {
            return false;
        }
        match (&self.min_pk, &self.max_pk) {
            (Some(min), Some(max)) if pk >= min && pk <= max => {
                pk.with_hash_bytes(|bytes| self.bloom.might_contain(bytes))
            }
            _ => false,
        }
    }

    /// Unions `other` into this index.
    ///
    /// Both indexes must share key type and filter shape; nothing changes on error.
    pub fn merge(&mut self, other: &PrimaryKeyIndex) -> CoreResult<()> {
        if self.pk_type != other.pk_type {
            return Err(CoreError::IncompatibleIndex(format!(
                "key types differ: {} vs {}",
                self.pk_type, other.pk_type
            )));
        }
        self.bloom.union(&other.bloom)?;
        if let Some(min) = &other.min_pk {
            self.extend_range(min);
        }
        if let Some(max) = &other.max_pk {
            self.extend_range(max);
        }
        Ok(())
    }

    /// Snapshot for the stats log, labelled with the schema's primary-key field.
    pub fn to_stats(&self, field_id: FieldId, pk_type: PkType) -> CoreResult<PrimaryKeyStats> {
        self.check_type(pk_type)?;
        Ok(PrimaryKeyStats {
            field_id,
            pk_type,
            min_pk: self.min_pk.clone(),
            max_pk: self.max_pk.clone(),
            bloom: self.bloom.clone(),
        })
    }

    /// Rebuilds an index from a decoded stats record.
    pub fn from_stats(stats: PrimaryKeyStats) -> CoreResult<Self> {
        stats.bloom.validate()?;
        for bound in [&stats.min_pk, &stats.max_pk].into_iter().flatten() {
            if bound.pk_type() != stats.pk_type {
                return Err(CoreError::Deserialization(format!(
                    "stats for field {} hold a {} bound in a {} index",
                    stats.field_id,
                    bound.pk_type(),
                    stats.pk_type
                )));
            }
        }
        Ok(Self {
            field_id: stats.field_id,
            pk_type: stats.pk_type,
            min_pk: stats.min_pk,
            max_pk: stats.max_pk,
            bloom: stats.bloom,
        })
    }

    /// Seeds an index from the first record and merges the rest into it.
    ///
    /// Returns `None` for an empty input.
    pub fn from_stats_list(stats: Vec<PrimaryKeyStats>) -> CoreResult<Option<Self>> {
        let mut iter = stats.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut index = Self::from_stats(first)?;
        for next in iter {
            index.merge(&Self::from_stats(next)?)?;
        }
        Ok(Some(index))
    }

    fn check_type(&self, actual: PkType) -> CoreResult<()> {
        if actual != self.pk_type {
            return Err(CoreError::PrimaryKeyTypeMismatch {
                expected: self.pk_type.as_str(),
                actual: actual.as_str(),
            });
        }
        Ok(())
    }

    fn insert_unchecked(&mut self, pk: &PrimaryKey) {
        pk.with_hash_bytes(|bytes| self.bloom.insert(bytes));
        self.extend_range(pk);
    }

    fn extend_range(&mut self, pk: &PrimaryKey) {
        if self.min_pk.as_ref().map_or(true, |min| pk < min) {
            self.min_pk = Some(pk.clone());
        }
        if self.max_pk.as_ref().map_or(true, |max| pk > max) {
            self.max_pk = Some(pk.clone());
        }
    }
}
