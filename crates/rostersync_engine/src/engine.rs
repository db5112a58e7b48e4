//! The client sync engine.
//!
//! Three protocols share one [`ClientSyncState`]:
//! - **Load**: publish the cache immediately, then refresh in the background;
//!   with an empty cache, fetch from the server first.
//! - **Refresh**: fetch the full set and replace the cache, unless it is no
//!   newer than the last snapshot published.
//! - **Write**: optimistic write at the store's version, with one forced
//!   resync and retry on a stale rejection.
//!
//! Realtime events go through [`SyncEngine::apply_remote`]. Every publish
//! path compares versions at apply time, so results are reconciled by
//! version and never by arrival order.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::{ClientState, ClientStore, StoreAction};
use crate::transport::SyncTransport;
use parking_lot::{Mutex, RwLock};
use rostersync_protocol::{
    classify, EditableField, GlobalVersion, Record, RecordPatch, RecordUpdated,
    WriteClassification, WriteRequest,
};
use rostersync_storage::RecordCache;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Attempts per edit: the first try plus one retry after a forced resync.
pub const MAX_WRITE_ATTEMPTS: u32 = 2;

/// Where a load got its records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// The local cache was non-empty.
    Cache,
    /// The cache was empty and the server answered.
    Server,
    /// The cache was empty and the server failed; the store shows the error.
    CacheFallback,
}

/// Result of [`SyncEngine::load`].
#[derive(Debug)]
pub struct LoadOutcome {
    /// The records published to the store.
    pub records: Vec<Record>,
    /// Where they came from.
    pub source: LoadSource,
    /// The background refresh started by a cache-served load.
    pub refresh: Option<RefreshHandle>,
}

/// Result of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot replaced the cache and the store.
    Applied {
        /// Version of the applied snapshot.
        global_version: GlobalVersion,
    },
    /// The last snapshot published was this version or newer, or a newer
    /// load started meanwhile. Nothing was changed.
    Superseded {
        /// Version of the discarded snapshot.
        global_version: GlobalVersion,
    },
}

impl RefreshOutcome {
    /// Returns true if the snapshot was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, RefreshOutcome::Applied { .. })
    }
}

/// A refresh running on its own thread.
#[derive(Debug)]
pub struct RefreshHandle {
    thread: JoinHandle<SyncResult<RefreshOutcome>>,
}

impl RefreshHandle {
    /// Waits for the refresh to finish.
    ///
    /// # Errors
    ///
    /// Returns the refresh error, or [`SyncError::Protocol`] if the refresh
    /// thread panicked.
    pub fn join(self) -> SyncResult<RefreshOutcome> {
        self.thread
            .join()
            .map_err(|_| SyncError::Protocol("refresh thread panicked".into()))?
    }

    /// Returns true once the refresh has finished.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Whether a realtime event changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event was newer than what the client reflects for the record.
    Applied,
    /// The event was an echo or older than local state.
    Ignored,
}

/// Counters about engine activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Loads started.
    pub loads: u64,
    /// Refresh snapshots applied.
    pub refreshes: u64,
    /// Refresh snapshots discarded as not newer.
    pub superseded_refreshes: u64,
    /// Writes the server accepted.
    pub writes_accepted: u64,
    /// Stale-version rejections received.
    pub stale_rejections: u64,
    /// Forced resyncs after a stale rejection.
    pub resyncs: u64,
    /// Realtime events applied.
    pub remote_applied: u64,
    /// Realtime events ignored.
    pub remote_ignored: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Version bookkeeping used to reconcile out-of-order results.
#[derive(Debug, Default)]
struct ClientSyncState {
    /// Version of the last full snapshot published.
    floor: GlobalVersion,
    /// Versions of single records applied since that snapshot.
    record_versions: HashMap<String, GlobalVersion>,
    /// Whether a snapshot has been published.
    hydrated: bool,
    /// Bumped by every load; older loads and refreshes lose.
    load_generation: u64,
}

impl ClientSyncState {
    fn known_version(&self, id: &str) -> GlobalVersion {
        self.record_versions
            .get(id)
            .copied()
            .map_or(self.floor, |v| v.max(self.floor))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotSource {
    Cache,
    Server,
    Refresh,
}

struct Inner<T> {
    config: SyncConfig,
    transport: T,
    cache: Arc<dyn RecordCache>,
    store: ClientStore,
    sync: Mutex<ClientSyncState>,
    in_flight: Mutex<HashSet<String>>,
    stats: RwLock<SyncStats>,
}

/// Marks a record as having a write in flight until dropped.
struct InFlightGuard<'a> {
    table: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(table: &'a Mutex<HashSet<String>>, id: &str) -> SyncResult<Self> {
        if !table.lock().insert(id.to_string()) {
            return Err(SyncError::WriteInFlight { id: id.to_string() });
        }
        Ok(Self {
            table,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.table.lock().remove(&self.id);
    }
}

/// The client sync engine.
///
/// Cloning is cheap and yields a handle to the same engine; background
/// refreshes and the realtime listener hold such clones.
pub struct SyncEngine<T: SyncTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: SyncTransport> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SyncTransport + 'static> SyncEngine<T> {
    /// Creates an engine over a transport and a local cache.
    pub fn new(config: SyncConfig, transport: T, cache: Arc<dyn RecordCache>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                cache,
                store: ClientStore::new(),
                sync: Mutex::new(ClientSyncState::default()),
                in_flight: Mutex::new(HashSet::new()),
                stats: RwLock::new(SyncStats::default()),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Returns the local cache.
    pub fn cache(&self) -> &Arc<dyn RecordCache> {
        &self.inner.cache
    }

    /// Returns the reactive store.
    pub fn store(&self) -> &ClientStore {
        &self.inner.store
    }

    /// Returns a copy of the current store state.
    pub fn snapshot(&self) -> ClientState {
        self.inner.store.snapshot()
    }

    /// Subscribes to store changes.
    pub fn subscribe(&self) -> Receiver<ClientState> {
        self.inner.store.subscribe()
    }

    /// Returns the global version the store reflects.
    pub fn global_version(&self) -> GlobalVersion {
        self.inner.store.global_version()
    }

    /// Returns the current stats.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Closes the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's close error.
    pub fn close(&self) -> SyncResult<()> {
        self.inner.transport.close()
    }

    fn client(&self) -> &str {
        &self.inner.config.client_name
    }

    /// Runs the load protocol.
    ///
    /// A non-empty cache is published right away and, if configured, a
    /// refresh is started in the background. An empty cache is filled from
    /// the server. A server failure is published as the store error and the
    /// (empty) cache is returned with [`LoadSource::CacheFallback`].
    ///
    /// # Errors
    ///
    /// Currently always succeeds; failures degrade to the cache.
    pub fn load(&self) -> SyncResult<LoadOutcome> {
        let generation = {
            let mut sync = self.inner.sync.lock();
            sync.load_generation += 1;
            sync.load_generation
        };
        self.inner.stats.write().loads += 1;
        self.inner.store.dispatch(StoreAction::SetLoading(true));

        let cached = self.inner.cache.get_all().unwrap_or_else(|err| {
            tracing::error!(client = self.client(), error = %err, "failed to read cache");
            Vec::new()
        });

        if !cached.is_empty() {
            let version = match self.inner.cache.last_version() {
                Ok(version) => version.unwrap_or(GlobalVersion::INITIAL),
                Err(err) => {
                    tracing::error!(client = self.client(), error = %err, "failed to read cache version");
                    GlobalVersion::INITIAL
                }
            };
            tracing::info!(
                client = self.client(),
                records = cached.len(),
                version = %version,
                "loaded from cache"
            );
            self.publish_snapshot(cached.clone(), version, generation, SnapshotSource::Cache);

            let refresh = self
                .inner
                .config
                .refresh_on_load
                .then(|| self.spawn_refresh(generation));
            return Ok(LoadOutcome {
                records: cached,
                source: LoadSource::Cache,
                refresh,
            });
        }

        tracing::debug!(client = self.client(), "cache empty; fetching from server");
        match self.inner.transport.fetch_all() {
            Ok(snapshot) => {
                tracing::info!(
                    client = self.client(),
                    records = snapshot.records.len(),
                    version = %snapshot.global_version,
                    "loaded from server"
                );
                let records = snapshot.records.clone();
                self.publish_snapshot(
                    snapshot.records,
                    snapshot.global_version,
                    generation,
                    SnapshotSource::Server,
                );
                Ok(LoadOutcome {
                    records,
                    source: LoadSource::Server,
                    refresh: None,
                })
            }
            Err(err) => {
                tracing::warn!(client = self.client(), error = %err, "load failed; showing cache");
                self.record_error(&err);
                self.inner
                    .store
                    .dispatch(StoreAction::SetError(Some(err.to_string())));
                Ok(LoadOutcome {
                    records: cached,
                    source: LoadSource::CacheFallback,
                    refresh: None,
                })
            }
        }
    }

    /// Runs the refresh protocol on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the fetch error. The store keeps its records, shows the
    /// error, and clears its refreshing flag.
    pub fn refresh(&self) -> SyncResult<RefreshOutcome> {
        let generation = self.inner.sync.lock().load_generation;
        self.refresh_for(generation)
    }

    /// Runs the refresh protocol on a new thread.
    pub fn refresh_in_background(&self) -> RefreshHandle {
        let generation = self.inner.sync.lock().load_generation;
        self.spawn_refresh(generation)
    }

    /// Called after the realtime channel reconnects or reports lost events.
    ///
    /// Missed updates are never replayed, so this refreshes.
    ///
    /// # Errors
    ///
    /// Returns the refresh error.
    pub fn on_reconnect(&self) -> SyncResult<RefreshOutcome> {
        tracing::info!(client = self.client(), "realtime reconnected; refreshing");
        self.refresh()
    }

    fn spawn_refresh(&self, generation: u64) -> RefreshHandle {
        let engine = self.clone();
        RefreshHandle {
            thread: std::thread::spawn(move || engine.refresh_for(generation)),
        }
    }

    fn refresh_for(&self, generation: u64) -> SyncResult<RefreshOutcome> {
        self.inner.store.dispatch(StoreAction::SetRefreshing(true));

        match self.inner.transport.fetch_all() {
            Ok(snapshot) => Ok(self.publish_snapshot(
                snapshot.records,
                snapshot.global_version,
                generation,
                SnapshotSource::Refresh,
            )),
            Err(err) => {
                tracing::warn!(client = self.client(), error = %err, "refresh failed; keeping current records");
                self.record_error(&err);
                self.inner
                    .store
                    .dispatch(StoreAction::SetError(Some(err.to_string())));
                Err(err)
            }
        }
    }

    /// Publishes a full record set if it is newer than the last one.
    ///
    /// Single-record updates applied after the previous snapshot do not block
    /// a newer snapshot; records whose applied version is newer than the
    /// snapshot are kept instead of overwritten.
    fn publish_snapshot(
        &self,
        records: Vec<Record>,
        version: GlobalVersion,
        generation: u64,
        source: SnapshotSource,
    ) -> RefreshOutcome {
        let store = &self.inner.store;
        let mut sync = self.inner.sync.lock();

        let stale_generation = generation != sync.load_generation;
        let not_newer = sync.hydrated && version <= sync.floor;
        if stale_generation || not_newer {
            tracing::debug!(
                client = self.client(),
                version = %version,
                floor = %sync.floor,
                stale_generation,
                "discarding snapshot"
            );
            match source {
                SnapshotSource::Refresh => store.dispatch(StoreAction::SetRefreshing(false)),
                _ if !stale_generation => store.dispatch(StoreAction::SetLoading(false)),
                _ => {}
            }
            if source == SnapshotSource::Refresh {
                self.inner.stats.write().superseded_refreshes += 1;
            }
            return RefreshOutcome::Superseded {
                global_version: version,
            };
        }

        sync.record_versions.retain(|_, v| *v > version);
        let records = merge_newer(records, &sync.record_versions, store);
        let shown = version.max(store.global_version());

        let written = match source {
            SnapshotSource::Cache => Ok(()),
            SnapshotSource::Server => self.inner.cache.put_many(&records),
            SnapshotSource::Refresh => self.inner.cache.replace_all(&records),
        }
        .and_then(|()| match source {
            SnapshotSource::Cache => Ok(()),
            _ => self.inner.cache.set_last_version(version),
        });
        if let Err(err) = written {
            tracing::error!(client = self.client(), error = %err, "failed to write snapshot to cache");
        }

        sync.floor = version;
        sync.hydrated = true;

        let action = match source {
            SnapshotSource::Refresh => StoreAction::MergeRecords {
                records,
                global_version: shown,
            },
            _ => StoreAction::SetRecords {
                records,
                global_version: shown,
            },
        };
        store.dispatch(action);

        if source == SnapshotSource::Refresh {
            self.inner.stats.write().refreshes += 1;
            tracing::debug!(client = self.client(), version = %version, "refresh applied");
        }
        RefreshOutcome::Applied {
            global_version: version,
        }
    }

    /// Merges a realtime event.
    ///
    /// The event is ignored unless its version is newer than what the client
    /// already reflects for that record: the last snapshot's version, or the
    /// version of the last write or event applied to the record.
    pub fn apply_remote(&self, event: &RecordUpdated) -> ApplyOutcome {
        let outcome = self.apply_versioned(event.record.clone(), event.global_version);
        let mut stats = self.inner.stats.write();
        match outcome {
            ApplyOutcome::Applied => stats.remote_applied += 1,
            ApplyOutcome::Ignored => stats.remote_ignored += 1,
        }
        outcome
    }

    fn apply_versioned(&self, record: Record, version: GlobalVersion) -> ApplyOutcome {
        let store = &self.inner.store;
        let mut sync = self.inner.sync.lock();

        let known = sync.known_version(&record.id);
        if version <= known {
            tracing::debug!(
                client = self.client(),
                record = %record.id,
                version = %version,
                known = %known,
                "ignoring update that is not newer"
            );
            return ApplyOutcome::Ignored;
        }

        sync.record_versions.insert(record.id.clone(), version);
        if let Err(err) = self.inner.cache.put(&record) {
            tracing::error!(client = self.client(), record = %record.id, error = %err, "failed to cache record");
        }
        store.dispatch(StoreAction::UpsertRecord(record));
        if version > store.global_version() {
            store.dispatch(StoreAction::SetGlobalVersion(version));
        }
        ApplyOutcome::Applied
    }

    /// Validates raw input for one field and writes it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] without touching the network if the
    /// input is rejected, otherwise whatever [`SyncEngine::write`] returns.
    pub fn update_field(&self, id: &str, field: EditableField, raw: &str) -> SyncResult<Record> {
        let patch = RecordPatch::field(field, raw)?;
        self.write(id, patch)
    }

    /// Runs the write protocol for one record.
    ///
    /// The write is sent at the store's global version. A stale rejection
    /// triggers one resync and one retry; a second rejection is terminal.
    /// Transport, not-found, and server validation errors are returned at
    /// once. Failures are recorded against every field of the patch and
    /// leave all other state untouched.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] if the patch fails local validation
    /// - [`SyncError::WriteInFlight`] if a write to `id` has not settled
    /// - [`SyncError::StaleVersion`] after the second stale rejection
    /// - [`SyncError::Transport`], [`SyncError::NotFound`]
    pub fn write(&self, id: &str, patch: RecordPatch) -> SyncResult<Record> {
        let patch = patch.normalized();
        patch.validate()?;

        let _guard = InFlightGuard::acquire(&self.inner.in_flight, id)?;
        let fields = patch.fields();

        match self.write_with_retry(id, &patch) {
            Ok(record) => {
                for field in fields {
                    self.inner.store.dispatch(StoreAction::ClearFieldError {
                        id: id.to_string(),
                        field,
                    });
                }
                Ok(record)
            }
            Err(err) => {
                self.record_error(&err);
                for field in fields {
                    self.inner.store.dispatch(StoreAction::SetFieldError {
                        id: id.to_string(),
                        field,
                        message: err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    fn write_with_retry(&self, id: &str, patch: &RecordPatch) -> SyncResult<Record> {
        let max_attempts = self.inner.config.max_write_attempts();

        for attempt in 1..=max_attempts {
            let client_version = self.inner.store.global_version();
            let request = WriteRequest::new(id, patch.clone(), client_version);
            tracing::debug!(
                client = self.client(),
                record = id,
                attempt,
                version = %client_version,
                "submitting write"
            );

            match classify(client_version, self.inner.transport.write(&request)) {
                WriteClassification::Accepted {
                    record,
                    global_version,
                } => {
                    tracing::info!(
                        client = self.client(),
                        record = id,
                        version = %global_version,
                        "write accepted"
                    );
                    self.inner.stats.write().writes_accepted += 1;
                    self.apply_versioned(record.clone(), global_version);
                    return Ok(record);
                }
                WriteClassification::StaleVersion { server_version } => {
                    self.inner.stats.write().stale_rejections += 1;
                    if attempt == max_attempts {
                        tracing::warn!(
                            client = self.client(),
                            record = id,
                            server = %server_version,
                            "write still stale after resync"
                        );
                        return Err(SyncError::StaleVersion { server_version });
                    }
                    tracing::warn!(
                        client = self.client(),
                        record = id,
                        client_version = %client_version,
                        server = %server_version,
                        "stale write; resyncing"
                    );
                    self.resync()?;
                }
                WriteClassification::TransportError { message, retryable } => {
                    return Err(SyncError::Transport { message, retryable });
                }
                WriteClassification::ValidationError { message } => {
                    let fields = patch.fields();
                    let field = match fields.as_slice() {
                        [only] => Some(*only),
                        _ => None,
                    };
                    return Err(SyncError::Validation { field, message });
                }
                WriteClassification::NotFound { message } => {
                    tracing::warn!(client = self.client(), record = id, message = %message, "record vanished");
                    return Err(SyncError::NotFound { id: id.to_string() });
                }
            }
        }

        Err(SyncError::Protocol("no write attempts made".into()))
    }

    fn resync(&self) -> SyncResult<RefreshOutcome> {
        self.inner.stats.write().resyncs += 1;
        let generation = self.inner.sync.lock().load_generation;
        let snapshot = self.inner.transport.fetch_all()?;
        Ok(self.publish_snapshot(
            snapshot.records,
            snapshot.global_version,
            generation,
            SnapshotSource::Refresh,
        ))
    }

    fn record_error(&self, err: &SyncError) {
        self.inner.stats.write().last_error = Some(err.to_string());
    }
}

/// Swaps in the store's copy of every record updated past the snapshot.
fn merge_newer(
    mut records: Vec<Record>,
    newer: &HashMap<String, GlobalVersion>,
    store: &ClientStore,
) -> Vec<Record> {
    if newer.is_empty() {
        return records;
    }
    for slot in records.iter_mut() {
        if newer.contains_key(&slot.id) {
            if let Some(current) = store.record(&slot.id) {
                *slot = current;
            }
        }
    }
    for id in newer.keys() {
        if !records.iter().any(|r| &r.id == id) {
            if let Some(current) = store.record(id) {
                records.push(current);
            }
        }
    }
    records
}
