//! Main record server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::realtime::{RealtimeSession, SessionId};
use crate::seed::default_roster;
use crate::store::{ensure_seed_data, MemoryRecordStore, RecordStore};
use crate::version::VersionAuthority;
use rostersync_protocol::{
    FetchResponse, GlobalVersion, HealthStatus, HttpRequest, HttpResponse, WriteRequest,
    WriteResponse,
};
use std::sync::Arc;

/// The record server.
///
/// Owns the record store, the version authority, and the realtime hub.
/// Transports call [`SyncServer::handle_request`] (wire form) or the typed
/// methods directly.
///
/// # Example
///
/// ```
/// use rostersync_server::{SyncServer, ServerConfig};
/// use rostersync_protocol::GlobalVersion;
///
/// let server = SyncServer::new(ServerConfig::default()).unwrap();
/// assert_eq!(server.global_version(), GlobalVersion(1));
/// assert_eq!(server.fetch_all().unwrap().records.len(), 10);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server over an in-memory store.
    ///
    /// The store is seeded with the default roster when
    /// `config.seed_on_start` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if seeding fails.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        Self::with_store(
            config,
            Arc::new(MemoryRecordStore::new()),
            VersionAuthority::new(),
        )
    }

    /// Creates a server over an existing store and version counter.
    ///
    /// # Errors
    ///
    /// Returns an error if seeding fails.
    pub fn with_store(
        config: ServerConfig,
        store: Arc<dyn RecordStore>,
        versions: VersionAuthority,
    ) -> ServerResult<Self> {
        if config.seed_on_start {
            ensure_seed_data(store.as_ref(), default_roster())?;
        }

        let context = Arc::new(HandlerContext::new(config, store, versions));
        let handler = RequestHandler::new(Arc::clone(&context));

        tracing::info!(
            bind = %context.config.bind_addr,
            version = %context.versions.current_version(),
            "record server ready"
        );
        Ok(Self { handler, context })
    }

    /// Returns every record and the version they reflect.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn fetch_all(&self) -> ServerResult<FetchResponse> {
        self.handler.fetch_all()
    }

    /// Applies a write if the client is current.
    ///
    /// # Errors
    ///
    /// Returns an error only for store or counter failures.
    pub fn write(&self, request: WriteRequest) -> ServerResult<WriteResponse> {
        self.handler.write(request)
    }

    /// Returns server liveness and counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn health(&self) -> ServerResult<HealthStatus> {
        self.handler.health()
    }

    /// Routes a wire request.
    pub fn handle_request(&self, request: &HttpRequest) -> HttpResponse {
        self.handler.handle_request(request)
    }

    /// Opens a realtime session.
    pub fn connect(&self) -> RealtimeSession {
        self.context.hub.connect()
    }

    /// Drops a realtime session.
    pub fn disconnect(&self, id: SessionId) -> bool {
        self.context.hub.disconnect(id)
    }

    /// Returns the number of connected realtime sessions.
    pub fn session_count(&self) -> usize {
        self.context.hub.session_count()
    }

    /// Returns the current global version.
    pub fn global_version(&self) -> GlobalVersion {
        self.context.versions.current_version()
    }

    /// Returns the record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.context.store
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }
}
