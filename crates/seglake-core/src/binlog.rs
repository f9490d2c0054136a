//! Reconciliation of per-field log file sets.
//!
//! Binlogs, statslogs and deltalogs are all stored as `Vec<FieldBinlog>`. A log is
//! identified by `(field_id, log_path)`; these helpers keep that pair unique while
//! merging, subtracting or replacing entries.

use std::collections::{BTreeMap, HashSet};

use crate::ids::FieldId;
use crate::segment::{Binlog, FieldBinlog};

/// Appends `incoming` onto `current`.
///
/// Paths already present for a field are left untouched, new paths are appended
/// in arrival order and unseen fields are added at the end.
#[must_use]
pub fn merge_field_binlogs(current: &[FieldBinlog], incoming: &[FieldBinlog]) -> Vec<FieldBinlog> {
    let mut merged = current.to_vec();
    for field in incoming {
        let slot = match merged.iter().position(|f| f.field_id == field.field_id) {
            Some(idx) => idx,
            None => {
                merged.push(FieldBinlog::new(field.field_id, Vec::new()));
                merged.len() - 1
            }
        };
        let target = &mut merged[slot];
        let mut seen: HashSet<String> = target.binlogs.iter().map(|b| b.log_path.clone()).collect();
        for binlog in &field.binlogs {
            if seen.insert(binlog.log_path.clone()) {
                target.binlogs.push(binlog.clone());
            }
        }
    }
    merged.retain(|f| !f.binlogs.is_empty());
    merged
}

/// Applies removals then additions to `origin`.
///
/// An added binlog replaces any existing entry with the same path. Fields left
/// without logs are dropped; the output is ordered by field id.
#[must_use]
pub fn update_binlogs(
    origin: &[FieldBinlog],
    removes: &[FieldBinlog],
    adds: &[FieldBinlog],
) -> Vec<FieldBinlog> {
    let mut fields: BTreeMap<FieldId, Vec<Binlog>> = BTreeMap::new();
    for field in origin {
        let logs = fields.entry(field.field_id).or_default();
        for binlog in &field.binlogs {
            upsert(logs, binlog);
        }
    }

    for field in removes {
        if let Some(logs) = fields.get_mut(&field.field_id) {
            let gone: HashSet<&str> = field.binlogs.iter().map(|b| b.log_path.as_str()).collect();
            logs.retain(|b| !gone.contains(b.log_path.as_str()));
        }
    }

    for field in adds {
        let logs = fields.entry(field.field_id).or_default();
        for binlog in &field.binlogs {
            upsert(logs, binlog);
        }
    }

    fields
        .into_iter()
        .filter(|(_, logs)| !logs.is_empty())
        .map(|(field_id, binlogs)| FieldBinlog::new(field_id, binlogs))
        .collect()
}

/// Keeps the entries of `origin` whose path is not listed under the same field in
/// `removes`.
#[must_use]
pub fn subtract_binlogs(origin: &[FieldBinlog], removes: &[FieldBinlog]) -> Vec<FieldBinlog> {
    let mut result = Vec::with_capacity(origin.len());
    for field in origin {
        let gone: HashSet<&str> = removes
            .iter()
            .filter(|r| r.field_id == field.field_id)
            .flat_map(|r| r.binlogs.iter().map(|b| b.log_path.as_str()))
            .collect();
        let kept: Vec<Binlog> = field
            .binlogs
            .iter()
            .filter(|b| !gone.contains(b.log_path.as_str()))
            .cloned()
            .collect();
        if !kept.is_empty() {
            result.push(FieldBinlog::new(field.field_id, kept));
        }
    }
    result
}

/// Total size in bytes of every log in the set.
#[must_use]
pub fn total_log_size(logs: &[FieldBinlog]) -> i64 {
    logs.iter()
        .flat_map(|f| f.binlogs.iter())
        .map(|b| b.log_size)
        .sum()
}

/// Paths of every log recorded for `field_id`.
#[must_use]
pub fn log_paths_of_field(logs: &[FieldBinlog], field_id: FieldId) -> Vec<String> {
    logs.iter()
        .filter(|f| f.field_id == field_id)
        .flat_map(|f| f.binlogs.iter().map(|b| b.log_path.clone()))
        .collect()
}

fn upsert(logs: &mut Vec<Binlog>, binlog: &Binlog) {
    match logs.iter_mut().find(|b| b.log_path == binlog.log_path) {
        Some(existing) => *existing = binlog.clone(),
        None => logs.push(binlog.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: i64, paths: &[&str]) -> FieldBinlog {
        FieldBinlog::new(
            FieldId::new(id),
            paths.iter().map(|p| Binlog::with_path(*p, 1)).collect(),
        )
    }

    fn paths(f: &FieldBinlog) -> Vec<&str> {
        f.binlogs.iter().map(|b| b.log_path.as_str()).collect()
    }

    #[test]
    fn test_merge_appends_and_dedups() {
        let current = vec![field(1, &["a", "b"])];
        let incoming = vec![field(1, &["b", "c"]), field(2, &["x"])];

        let merged = merge_field_binlogs(&current, &incoming);
        assert_eq!(merged.len(), 2);
        assert_eq!(paths(&merged[0]), vec!["a", "b", "c"]);
        assert_eq!(paths(&merged[1]), vec!["x"]);
    }

    #[test]
    fn test_merge_keeps_existing_entry() {
        let mut existing = field(1, &["a"]);
        existing.binlogs[0].entries_num = 10;
        let mut replacement = field(1, &["a"]);
        replacement.binlogs[0].entries_num = 99;

        let merged = merge_field_binlogs(&[existing], &[replacement]);
        assert_eq!(merged[0].binlogs[0].entries_num, 10);
    }

    #[test]
    fn test_update_removes_and_adds() {
        let origin = vec![field(2, &["a", "b"]), field(1, &["z"])];
        let removes = vec![field(2, &["a"]), field(1, &["z"])];
        let adds = vec![field(3, &["n"])];

        let updated = update_binlogs(&origin, &removes, &adds);
        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0].field_id, FieldId::new(2));
        assert_eq!(paths(&updated[0]), vec!["b"]);
        assert_eq!(updated[1].field_id, FieldId::new(3));
    }

    #[test]
    fn test_subtract_keeps_new_deltas() {
        let origin = vec![field(0, &["d1", "d2", "d3"])];
        let folded = vec![field(0, &["d1", "d2"]), field(5, &["d3"])];

        let remaining = subtract_binlogs(&origin, &folded);
        assert_eq!(remaining.len(), 1);
        assert_eq!(paths(&remaining[0]), vec!["d3"]);

        let none_left = subtract_binlogs(&origin, &[field(0, &["d1", "d2", "d3"])]);
        assert!(none_left.is_empty());
    }

    #[test]
    fn test_log_paths_of_field() {
        let logs = vec![field(1, &["a"]), field(2, &["b", "c"])];
        assert_eq!(log_paths_of_field(&logs, FieldId::new(2)), vec!["b", "c"]);
        assert!(log_paths_of_field(&logs, FieldId::new(9)).is_empty());
        assert_eq!(total_log_size(&logs), 3);
    }
}
