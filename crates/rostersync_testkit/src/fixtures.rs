//! Test fixtures and cluster helpers.
//!
//! Provides an in-process server with any number of loopback clients, and
//! convenience constructors for caches.

use rostersync_engine::{HttpTransport, LoopbackClient, SyncConfig, SyncEngine};
use rostersync_protocol::{GlobalVersion, HttpRequest, HttpResponse, Record};
use rostersync_server::{
    default_roster, MemoryRecordStore, RealtimeSession, ServerConfig, SyncServer,
    VersionAuthority,
};
use rostersync_storage::{CacheConfig, FileCache, MemoryCache, RecordCache};
use std::sync::Arc;
use tempfile::TempDir;

/// Request handler closure routed by a [`LoopbackClient`].
pub type LoopbackHandler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// Transport that talks to an in-process server.
pub type LoopbackTransport = HttpTransport<LoopbackClient<LoopbackHandler>>;

/// A client engine over the loopback transport.
pub type TestClient = SyncEngine<LoopbackTransport>;

/// Base URL used by loopback clients.
pub const LOOPBACK_URL: &str = "http://loopback";

/// Returns the ten-record roster every test server starts with.
pub fn seed_records() -> Vec<Record> {
    default_roster()
}

/// Creates a seeded server whose counter starts at `version`.
pub fn test_server(version: u64) -> Arc<SyncServer> {
    Arc::new(
        SyncServer::with_store(
            ServerConfig::default(),
            Arc::new(MemoryRecordStore::with_records(seed_records())),
            VersionAuthority::with_version(GlobalVersion(version)),
        )
        .expect("Failed to start test server"),
    )
}

/// Creates a transport routed into `server`.
pub fn loopback_transport(server: &Arc<SyncServer>) -> LoopbackTransport {
    let server = Arc::clone(server);
    let handler: LoopbackHandler = Box::new(move |req| server.handle_request(req));
    HttpTransport::new(LOOPBACK_URL, LoopbackClient::new(handler))
}

/// Client configuration with background refresh off, so tests decide when
/// to refresh.
pub fn test_config(name: &str) -> SyncConfig {
    SyncConfig::new(LOOPBACK_URL)
        .with_client_name(name)
        .with_refresh_on_load(false)
}

/// Creates a client with an empty memory cache.
pub fn test_client(server: &Arc<SyncServer>, name: &str) -> TestClient {
    SyncEngine::new(
        test_config(name),
        loopback_transport(server),
        Arc::new(MemoryCache::new()),
    )
}

/// A server plus loopback clients.
pub struct TestCluster {
    /// The server.
    pub server: Arc<SyncServer>,
    /// Clients, named `client-1`, `client-2`, ...
    pub clients: Vec<TestClient>,
}

impl TestCluster {
    /// Creates a cluster whose server starts at version 1.
    pub fn new(clients: usize) -> Self {
        Self::at_version(1, clients)
    }

    /// Creates a cluster whose server starts at `version`.
    pub fn at_version(version: u64, clients: usize) -> Self {
        Self::with_server(test_server(version), clients)
    }

    /// Creates clients for an existing server.
    pub fn with_server(server: Arc<SyncServer>, clients: usize) -> Self {
        let clients = (1..=clients)
            .map(|i| test_client(&server, &format!("client-{i}")))
            .collect();
        Self { server, clients }
    }

    /// Returns client `index`.
    pub fn client(&self, index: usize) -> &TestClient {
        &self.clients[index]
    }

    /// Loads every client.
    pub fn load_all(&self) {
        for client in &self.clients {
            client.load().expect("Failed to load client");
        }
    }

    /// Opens one realtime session per client, in client order.
    pub fn connect_all(&self) -> Vec<RealtimeSession> {
        self.clients.iter().map(|_| self.server.connect()).collect()
    }

    /// Drains each client's session into it.
    pub fn drain_all(&self, sessions: &mut [RealtimeSession]) {
        for (client, session) in self.clients.iter().zip(sessions.iter_mut()) {
            rostersync_engine::drain(client, session);
        }
    }

    /// Returns the server's version.
    pub fn server_version(&self) -> GlobalVersion {
        self.server.global_version()
    }

    /// Returns true if every client shows the server's version and records.
    pub fn converged(&self) -> bool {
        let expected = self
            .server
            .fetch_all()
            .expect("Failed to fetch from test server");
        self.clients.iter().all(|client| {
            let state = client.snapshot();
            let mut shown = state.records;
            shown.sort_by(|a, b| a.id.cmp(&b.id));
            let mut authoritative = expected.records.clone();
            authoritative.sort_by(|a, b| a.id.cmp(&b.id));
            state.global_version == expected.global_version && shown == authoritative
        })
    }
}

/// A file cache in a temporary directory.
pub struct TestCache {
    /// The cache.
    pub cache: Arc<FileCache>,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TestCache {
    /// Opens an empty file cache.
    pub fn file() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let cache = FileCache::open(&CacheConfig::new(dir.path())).expect("Failed to open cache");
        Self {
            cache: Arc::new(cache),
            dir,
        }
    }

    /// Returns the cache directory.
    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A memory cache holding the seed roster at `version`.
    pub fn warm_cache(version: u64) -> Arc<MemoryCache> {
        Arc::new(MemoryCache::with_records(
            &seed_records(),
            GlobalVersion(version),
        ))
    }

    /// A client whose cache already holds the seed roster at `version`.
    pub fn cached_client(server: &Arc<SyncServer>, name: &str, version: u64) -> TestClient {
        let cache: Arc<dyn RecordCache> = warm_cache(version);
        SyncEngine::new(test_config(name), loopback_transport(server), cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rostersync_engine::LoadSource;
    use rostersync_protocol::RecordPatch;

    #[test]
    fn cluster_clients_load_from_server() {
        let cluster = TestCluster::at_version(3, 2);
        cluster.load_all();
        assert_eq!(cluster.client(1).global_version(), GlobalVersion(3));
        assert!(cluster.converged());
    }

    #[test]
    fn cluster_converges_after_drain() {
        let cluster = TestCluster::new(3);
        cluster.load_all();
        let mut sessions = cluster.connect_all();

        let patch = RecordPatch {
            name: Some("Meera I.".into()),
            ..RecordPatch::default()
        };
        cluster.client(0).write("stu-004", patch).unwrap();
        assert!(!cluster.converged());

        cluster.drain_all(&mut sessions);
        assert!(cluster.converged());
    }

    #[test]
    fn cached_client_loads_from_cache() {
        let server = test_server(3);
        let client = scenarios::cached_client(&server, "warm", 3);
        let outcome = client.load().unwrap();
        assert_eq!(outcome.source, LoadSource::Cache);
        assert_eq!(client.global_version(), GlobalVersion(3));
    }

    #[test]
    fn test_cache_is_empty_and_durable() {
        let cache = TestCache::file();
        assert!(cache.cache.is_empty().unwrap());
        cache.cache.put_many(&seed_records()).unwrap();
        assert_eq!(
            FileCache::read_snapshot(cache.path()).unwrap().records.len(),
            10
        );
    }
}
