//! In-memory record cache.

use crate::cache::{CacheSnapshot, RecordCache};
use crate::error::StorageResult;
use parking_lot::RwLock;
use rostersync_protocol::{GlobalVersion, Record, RecordPatch};

/// A record cache held entirely in memory.
///
/// Suitable for:
/// - Unit and integration tests
/// - Clients that should start cold on every launch
///
/// # Example
///
/// ```rust
/// use rostersync_storage::{MemoryCache, RecordCache};
/// use rostersync_protocol::GlobalVersion;
///
/// let cache = MemoryCache::new();
/// assert!(cache.is_empty().unwrap());
/// cache.set_last_version(GlobalVersion(4)).unwrap();
/// assert_eq!(cache.last_version().unwrap(), Some(GlobalVersion(4)));
/// ```
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: RwLock<CacheSnapshot>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-filled with records at the given version.
    ///
    /// Useful for warm-start tests.
    #[must_use]
    pub fn with_records(records: &[Record], version: GlobalVersion) -> Self {
        let mut snapshot = CacheSnapshot {
            version: Some(version),
            ..CacheSnapshot::default()
        };
        snapshot.put_many(records);
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Returns a copy of the full cache contents.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.read().clone()
    }
}

impl RecordCache for MemoryCache {
    fn get_all(&self) -> StorageResult<Vec<Record>> {
        Ok(self.inner.read().sorted_records())
    }

    fn get_by_id(&self, id: &str) -> StorageResult<Option<Record>> {
        Ok(self.inner.read().records.get(id).cloned())
    }

    fn put_many(&self, records: &[Record]) -> StorageResult<()> {
        self.inner.write().put_many(records);
        Ok(())
    }

    fn put(&self, record: &Record) -> StorageResult<()> {
        self.inner.write().put_many(std::slice::from_ref(record));
        Ok(())
    }

    fn patch(&self, id: &str, patch: &RecordPatch) -> StorageResult<Record> {
        self.inner.write().patch(id, patch)
    }

    fn delete(&self, id: &str) -> StorageResult<bool> {
        Ok(self.inner.write().records.remove(id).is_some())
    }

    fn clear(&self) -> StorageResult<()> {
        self.inner.write().records.clear();
        Ok(())
    }

    fn replace_all(&self, records: &[Record]) -> StorageResult<()> {
        self.inner.write().replace_all(records);
        Ok(())
    }

    fn last_version(&self) -> StorageResult<Option<GlobalVersion>> {
        Ok(self.inner.read().version)
    }

    fn set_last_version(&self, version: GlobalVersion) -> StorageResult<()> {
        self.inner.write().version = Some(version);
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.inner.read().records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use rostersync_protocol::EditableField;

    fn record(id: &str, roll: &str) -> Record {
        Record {
            id: id.into(),
            roll_number: roll.into(),
            name: format!("Student {id}"),
            blood_group: "AB-".into(),
            class: "7".into(),
            section: "A".into(),
            phone: "555-0199".into(),
            email: format!("{id}@example.edu"),
            attendance: 64,
            last_updated: "2024-02-01T08:30:00.000Z".into(),
        }
    }

    #[test]
    fn memory_new_is_empty() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty().unwrap());
        assert_eq!(cache.last_version().unwrap(), None);
    }

    #[test]
    fn memory_put_and_get() {
        let cache = MemoryCache::new();
        cache.put(&record("stu-1", "R1")).unwrap();
        assert_eq!(cache.get_by_id("stu-1").unwrap(), Some(record("stu-1", "R1")));
        assert_eq!(cache.get_by_id("stu-2").unwrap(), None);
    }

    #[test]
    fn memory_put_many_overwrites() {
        let cache = MemoryCache::new();
        cache.put_many(&[record("a", "R1"), record("b", "R2")]).unwrap();

        let mut changed = record("a", "R1");
        changed.attendance = 12;
        cache.put_many(&[changed.clone()]).unwrap();

        assert_eq!(cache.len().unwrap(), 2);
        assert_eq!(cache.get_by_id("a").unwrap(), Some(changed));
    }

    #[test]
    fn memory_patch() {
        let cache = MemoryCache::new();
        cache.put(&record("a", "R1")).unwrap();

        let patch = RecordPatch::field(EditableField::Attendance, "99").unwrap();
        let patched = cache.patch("a", &patch).unwrap();
        assert_eq!(patched.attendance, 99);
        assert_eq!(cache.get_by_id("a").unwrap().unwrap().attendance, 99);

        let err = cache.patch("zzz", &patch).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn memory_delete_and_clear() {
        let cache = MemoryCache::new();
        cache.put_many(&[record("a", "R1"), record("b", "R2")]).unwrap();
        cache.set_last_version(GlobalVersion(3)).unwrap();

        assert!(cache.delete("a").unwrap());
        assert!(!cache.delete("a").unwrap());

        cache.clear().unwrap();
        assert!(cache.is_empty().unwrap());
        assert_eq!(cache.last_version().unwrap(), Some(GlobalVersion(3)));
    }

    #[test]
    fn memory_replace_all() {
        let cache = MemoryCache::with_records(&[record("a", "R1")], GlobalVersion(2));
        cache.replace_all(&[record("b", "R2"), record("c", "R3")]).unwrap();

        let ids: Vec<_> = cache.get_all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
