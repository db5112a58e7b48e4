//! Record cache trait and the snapshot both implementations share.

use crate::error::{StorageError, StorageResult};
use rostersync_protocol::{GlobalVersion, Record, RecordPatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A client-local mirror of the server's records.
///
/// The cache is a mirror, not a second source of truth: the sync engine
/// writes to it only after the server has accepted a write or a fetch has
/// returned.
///
/// # Invariants
///
/// - `get_all` returns records ordered by roll number, then id
/// - `replace_all` is observed as a single step; no reader sees a
///   partially replaced set
/// - `last_version` returns the value most recently passed to
///   `set_last_version` (or `None` for a fresh cache)
///
/// # Implementors
///
/// - [`super::MemoryCache`] - For tests and ephemeral clients
/// - [`super::FileCache`] - Survives restarts
pub trait RecordCache: Send + Sync {
    /// Returns every cached record.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    fn get_all(&self) -> StorageResult<Vec<Record>>;

    /// Returns the record with the given id, if cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    fn get_by_id(&self, id: &str) -> StorageResult<Option<Record>>;

    /// Inserts or replaces the given records.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn put_many(&self, records: &[Record]) -> StorageResult<()>;

    /// Inserts or replaces one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn put(&self, record: &Record) -> StorageResult<()>;

    /// Applies a patch to a cached record and returns the result.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the record is not cached.
    fn patch(&self, id: &str, patch: &RecordPatch) -> StorageResult<Record>;

    /// Removes a record. Returns true if it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Removes every record. The last-known version is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn clear(&self) -> StorageResult<()>;

    /// Replaces the full record set in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn replace_all(&self, records: &[Record]) -> StorageResult<()>;

    /// Returns the last global version recorded alongside the records.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    fn last_version(&self) -> StorageResult<Option<GlobalVersion>>;

    /// Records the global version the cached set reflects.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn set_last_version(&self, version: GlobalVersion) -> StorageResult<()>;

    /// Returns the number of cached records.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    fn len(&self) -> StorageResult<usize> {
        Ok(self.get_all()?.len())
    }

    /// Returns true if no record is cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// The full contents of a cache: records keyed by id plus the version.
///
/// This is also the on-disk format of [`super::FileCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// Last global version the records reflect.
    pub version: Option<GlobalVersion>,
    /// Records keyed by id.
    pub records: BTreeMap<String, Record>,
}

impl CacheSnapshot {
    /// Returns the records ordered by roll number, then id.
    pub fn sorted_records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.roll_number
                .cmp(&b.roll_number)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    pub(crate) fn put_many(&mut self, records: &[Record]) {
        for record in records {
            self.records.insert(record.id.clone(), record.clone());
        }
    }

    pub(crate) fn patch(&mut self, id: &str, patch: &RecordPatch) -> StorageResult<Record> {
        let current = self
            .records
            .get(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        let next = current.apply_patch(patch);
        self.records.insert(id.to_string(), next.clone());
        Ok(next)
    }

    pub(crate) fn replace_all(&mut self, records: &[Record]) {
        self.records.clear();
        self.put_many(records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, roll: &str) -> Record {
        Record {
            id: id.into(),
            roll_number: roll.into(),
            name: format!("Student {id}"),
            blood_group: "A+".into(),
            class: "8".into(),
            section: "B".into(),
            phone: "555-0100".into(),
            email: format!("{id}@example.edu"),
            attendance: 80,
            last_updated: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn sorted_by_roll_number() {
        let mut snapshot = CacheSnapshot::default();
        snapshot.put_many(&[record("a", "R3"), record("b", "R1"), record("c", "R2")]);
        let ids: Vec<_> = snapshot
            .sorted_records()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn patch_missing_is_not_found() {
        let mut snapshot = CacheSnapshot::default();
        let err = snapshot
            .patch("ghost", &RecordPatch::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { id } if id == "ghost"));
    }

    #[test]
    fn replace_all_drops_absent_records() {
        let mut snapshot = CacheSnapshot::default();
        snapshot.put_many(&[record("a", "R1"), record("b", "R2")]);
        snapshot.replace_all(&[record("c", "R3")]);
        assert_eq!(snapshot.records.len(), 1);
        assert!(snapshot.records.contains_key("c"));
    }
}
