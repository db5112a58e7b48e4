//! Durable record cache backed by a single snapshot file.
//!
//! Directory layout:
//!
//! ```text
//! <cache_dir>/
//! ├─ LOCK               # Advisory lock for single-process access
//! ├─ records.cbor       # Current snapshot
//! └─ records.cbor.tmp   # Snapshot being written (transient)
//! ```

use crate::cache::{CacheSnapshot, RecordCache};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use rostersync_codec::{from_cbor, to_cbor};
use rostersync_protocol::{GlobalVersion, Record, RecordPatch};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const SNAPSHOT_FILE: &str = "records.cbor";
const SNAPSHOT_TEMP: &str = "records.cbor.tmp";

/// Where and how to open a [`FileCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cache directory.
    pub path: PathBuf,
    /// Create the directory (and parents) if missing.
    pub create_dirs: bool,
}

impl CacheConfig {
    /// Creates a config for the given directory, creating it if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_dirs: true,
        }
    }

    /// Sets whether a missing directory is created.
    #[must_use]
    pub fn create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }
}

/// A record cache that survives process restarts.
///
/// # Durability
///
/// Every mutation rewrites the snapshot using write-then-rename:
/// 1. Write the new snapshot to a temporary file
/// 2. Sync the temporary file
/// 3. Rename it over `records.cbor`
/// 4. Sync the directory
///
/// The in-memory copy is only updated after the rename succeeds, so a
/// failed write leaves both the file and the cache unchanged.
///
/// # Locking
///
/// The cache holds an exclusive advisory lock on `LOCK` for its lifetime.
/// A second open of the same directory fails with
/// [`StorageError::Locked`].
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    state: Mutex<CacheSnapshot>,
    _lock_file: File,
}

impl FileCache {
    /// Opens the cache described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_dirs` is false
    /// - Another process holds the lock
    /// - The existing snapshot cannot be decoded
    pub fn open(config: &CacheConfig) -> StorageResult<Self> {
        let path = config.path.as_path();

        if config.create_dirs {
            fs::create_dir_all(path)?;
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        let snapshot = load_snapshot(&path.join(SNAPSHOT_FILE))?;
        tracing::debug!(
            path = %path.display(),
            records = snapshot.records.len(),
            version = ?snapshot.version,
            "opened file cache"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(snapshot),
            _lock_file: lock_file,
        })
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of the full cache contents.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        self.state.lock().clone()
    }

    /// Reads the snapshot of a cache directory without taking its lock.
    ///
    /// Used by tooling to inspect a cache owned by a running client.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read.
    pub fn read_snapshot(dir: &Path) -> StorageResult<CacheSnapshot> {
        load_snapshot(&dir.join(SNAPSHOT_FILE))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut CacheSnapshot) -> StorageResult<T>) -> StorageResult<T> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(out)
    }

    fn persist(&self, snapshot: &CacheSnapshot) -> StorageResult<()> {
        let data = to_cbor(snapshot)?;
        let temp_path = self.path.join(SNAPSHOT_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.path.join(SNAPSHOT_FILE))?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> StorageResult<CacheSnapshot> {
    if !path.exists() {
        return Ok(CacheSnapshot::default());
    }

    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    if data.is_empty() {
        return Ok(CacheSnapshot::default());
    }

    Ok(from_cbor(&data)?)
}

impl RecordCache for FileCache {
    fn get_all(&self) -> StorageResult<Vec<Record>> {
        Ok(self.state.lock().sorted_records())
    }

    fn get_by_id(&self, id: &str) -> StorageResult<Option<Record>> {
        Ok(self.state.lock().records.get(id).cloned())
    }

    fn put_many(&self, records: &[Record]) -> StorageResult<()> {
        self.mutate(|s| {
            s.put_many(records);
            Ok(())
        })
    }

    fn put(&self, record: &Record) -> StorageResult<()> {
        self.put_many(std::slice::from_ref(record))
    }

    fn patch(&self, id: &str, patch: &RecordPatch) -> StorageResult<Record> {
        self.mutate(|s| s.patch(id, patch))
    }

    fn delete(&self, id: &str) -> StorageResult<bool> {
        if !self.state.lock().records.contains_key(id) {
            return Ok(false);
        }
        self.mutate(|s| Ok(s.records.remove(id).is_some()))
    }

    fn clear(&self) -> StorageResult<()> {
        self.mutate(|s| {
            s.records.clear();
            Ok(())
        })
    }

    fn replace_all(&self, records: &[Record]) -> StorageResult<()> {
        self.mutate(|s| {
            s.replace_all(records);
            Ok(())
        })
    }

    fn last_version(&self) -> StorageResult<Option<GlobalVersion>> {
        Ok(self.state.lock().version)
    }

    fn set_last_version(&self, version: GlobalVersion) -> StorageResult<()> {
        self.mutate(|s| {
            s.version = Some(version);
            Ok(())
        })
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.state.lock().records.len())
    }
}
