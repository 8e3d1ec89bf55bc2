//! Reconciliation rules shared by the loader, staging cleanup and validation
//!
//! The current row for a key is the one carrying the highest version; every
//! other row with that key is outdated. A staged key is new when the target
//! does not hold it yet. Keys that are null never participate.

use std::collections::{BTreeMap, BTreeSet};

/// A row identified by `row_id`, holding `version` of entity `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRow<K, V, R> {
    pub key: K,
    pub version: V,
    pub row_id: R,
}

impl<K, V, R> VersionedRow<K, V, R> {
    pub fn new(key: K, version: V, row_id: R) -> Self {
        Self {
            key,
            version,
            row_id,
        }
    }
}

/// Staged keys that are not yet loaded. Null keys are dropped.
pub fn new_keys<'a, K, I>(staged: I, loaded: &BTreeSet<K>) -> BTreeSet<K>
where
    K: Ord + Clone + 'a,
    I: IntoIterator<Item = Option<&'a K>>,
{
    staged
        .into_iter()
        .flatten()
        .filter(|key| !loaded.contains(*key))
        .cloned()
        .collect()
}

/// Highest version seen per key.
pub fn latest_versions<K, V, R>(rows: &[VersionedRow<K, V, R>]) -> BTreeMap<&K, &V>
where
    K: Ord,
    V: Ord,
{
    let mut latest: BTreeMap<&K, &V> = BTreeMap::new();
    for row in rows {
        latest
            .entry(&row.key)
            .and_modify(|version| {
                if row.version > **version {
                    *version = &row.version;
                }
            })
            .or_insert(&row.version);
    }
    latest
}

/// Row ids whose version is strictly below the latest for their key, in input order.
pub fn outdated_rows<K, V, R>(rows: &[VersionedRow<K, V, R>]) -> Vec<R>
where
    K: Ord,
    V: Ord,
    R: Clone,
{
    let latest = latest_versions(rows);
    rows.iter()
        .filter(|row| {
            latest
                .get(&row.key)
                .is_some_and(|latest| row.version < **latest)
        })
        .map(|row| row.row_id.clone())
        .collect()
}

/// Every row id except one per key, in input order. The row kept is the first
/// one carrying the key's highest version, so ties at the top still collapse
/// to a single survivor.
pub fn superseded_rows<K, V, R>(rows: &[VersionedRow<K, V, R>]) -> Vec<R>
where
    K: Ord,
    V: Ord,
    R: Clone,
{
    let mut kept: BTreeMap<&K, usize> = BTreeMap::new();
    for (index, row) in rows.iter().enumerate() {
        kept.entry(&row.key)
            .and_modify(|current| {
                if row.version > rows[*current].version {
                    *current = index;
                }
            })
            .or_insert(index);
    }

    rows.iter()
        .enumerate()
        .filter(|(index, row)| kept.get(&row.key) != Some(index))
        .map(|(_, row)| row.row_id.clone())
        .collect()
}
