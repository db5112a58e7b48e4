//! Authoritative record storage.

use crate::error::ServerResult;
use parking_lot::RwLock;
use rostersync_protocol::Record;
use std::collections::BTreeMap;

/// The server's record table.
///
/// Implementations only store; version checks and broadcasting happen in
/// the request handler, which serializes writes through the version
/// authority.
pub trait RecordStore: Send + Sync {
    /// Returns every record ordered by roll number (ties broken by id).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self) -> ServerResult<Vec<Record>>;

    /// Returns the record with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, id: &str) -> ServerResult<Option<Record>>;

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn put(&self, record: Record) -> ServerResult<()>;

    /// Returns the number of records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn len(&self) -> ServerResult<usize>;

    /// Returns true if the store holds no records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn is_empty(&self) -> ServerResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Case-insensitive substring search over name, roll number, and email.
    ///
    /// An empty term matches everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn search(&self, term: &str) -> ServerResult<Vec<Record>> {
        let needle = term.trim().to_lowercase();
        let records = self.list()?;
        if needle.is_empty() {
            return Ok(records);
        }
        Ok(records
            .into_iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&needle)
                    || r.roll_number.to_lowercase().contains(&needle)
                    || r.email.to_lowercase().contains(&needle)
            })
            .collect())
    }
}

/// In-memory record store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, Record>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given records.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: RwLock::new(map),
        }
    }
}

impl RecordStore for MemoryRecordStore {
    fn list(&self) -> ServerResult<Vec<Record>> {
        let mut records: Vec<Record> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| {
            a.roll_number
                .cmp(&b.roll_number)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    fn get(&self, id: &str) -> ServerResult<Option<Record>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn put(&self, record: Record) -> ServerResult<()> {
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    fn len(&self) -> ServerResult<usize> {
        Ok(self.records.read().len())
    }
}

/// Loads `seed` into `store` if the store is empty.
///
/// Returns how many records were inserted (zero if the store already had
/// data).
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn ensure_seed_data(store: &dyn RecordStore, seed: Vec<Record>) -> ServerResult<usize> {
    if !store.is_empty()? {
        return Ok(0);
    }

    let count = seed.len();
    for record in seed {
        store.put(record)?;
    }
    tracing::info!(count, "seeded record store");
    Ok(count)
}
