//! Request handlers for the record endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::realtime::RealtimeHub;
use crate::store::RecordStore;
use crate::version::VersionAuthority;
use chrono::{SecondsFormat, Utc};
use rostersync_codec::{from_cbor, to_cbor};
use rostersync_protocol::{
    parse_record_path, FetchResponse, HealthStatus, HttpMethod, HttpRequest, HttpResponse,
    RecordUpdated, WriteBody, WriteRequest, WriteResponse, HEALTH_PATH, RECORDS_PATH,
};
use std::sync::Arc;

/// Shared state behind every handler.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The global version counter.
    pub versions: VersionAuthority,
    /// Authoritative records.
    pub store: Arc<dyn RecordStore>,
    /// Realtime fan-out.
    pub hub: RealtimeHub,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn RecordStore>,
        versions: VersionAuthority,
    ) -> Self {
        let hub = RealtimeHub::new(config.broadcast_capacity);
        Self {
            config,
            versions,
            store,
            hub,
        }
    }
}

/// Handler for record requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns every record and the version they reflect.
    ///
    /// The pair is read under the version lock so no write lands between
    /// reading the records and reading the version.
    pub fn fetch_all(&self) -> ServerResult<FetchResponse> {
        let guard = self.context.versions.lock();
        let records = self.context.store.list()?;
        Ok(FetchResponse::new(records, guard.current()))
    }

    /// Returns records matching `term`, with the current version.
    pub fn search(&self, term: &str) -> ServerResult<FetchResponse> {
        let guard = self.context.versions.lock();
        let records = self.context.store.search(term)?;
        Ok(FetchResponse::new(records, guard.current()))
    }

    /// Applies a write if the client is current.
    ///
    /// Order of checks:
    /// 1. Patch validation (400)
    /// 2. Version check under the lock (409, nothing applied)
    /// 3. Record lookup (404)
    /// 4. Apply, stamp, persist, bump, broadcast (200)
    ///
    /// The broadcast happens before the lock is released, so sessions see
    /// events in version order.
    ///
    /// # Errors
    ///
    /// Returns an error only for store or counter failures (500).
    pub fn write(&self, request: WriteRequest) -> ServerResult<WriteResponse> {
        let patch = request.patch.normalized();
        if let Err(err) = patch.validate() {
            tracing::debug!(id = %request.id, error = %err, "rejected invalid patch");
            return Ok(WriteResponse::Invalid {
                message: err.message,
            });
        }

        let mut guard = self.context.versions.lock();
        let server_version = guard.current();

        if request.client_version < server_version {
            tracing::warn!(
                id = %request.id,
                client = %request.client_version,
                server = %server_version,
                "stale write rejected"
            );
            return Ok(WriteResponse::StaleVersion { server_version });
        }

        let Some(current) = self.context.store.get(&request.id)? else {
            return Ok(WriteResponse::NotFound {
                message: "Record not found".into(),
            });
        };

        let global_version = guard.peek_next()?;
        let mut record = current.apply_patch(&patch);
        record.last_updated = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.context.store.put(record.clone())?;
        guard.bump()?;

        let event = RecordUpdated::new(record.clone(), global_version);
        let delivered = self.context.hub.publish(&event);
        drop(guard);

        tracing::info!(
            id = %record.id,
            fields = ?patch.fields(),
            version = %global_version,
            delivered,
            "write accepted"
        );

        Ok(WriteResponse::Accepted {
            record,
            global_version,
        })
    }

    /// Returns server liveness and counters.
    pub fn health(&self) -> ServerResult<HealthStatus> {
        Ok(HealthStatus {
            status: "ok".into(),
            global_version: self.context.versions.current_version(),
            record_count: self.context.store.len()?,
            connected_sessions: self.context.hub.session_count(),
        })
    }

    /// Routes a wire request with a CBOR body.
    ///
    /// | Route                    | Success body      |
    /// |--------------------------|-------------------|
    /// | `GET /api/records`       | [`FetchResponse`] |
    /// | `GET /api/records?q=t`   | [`FetchResponse`] |
    /// | `PUT /api/records/{id}`  | [`WriteResponse`] |
    /// | `GET /health`            | [`HealthStatus`]  |
    pub fn handle_request(&self, request: &HttpRequest) -> HttpResponse {
        let (path, query) = split_target(&request.url);

        let result = match (request.method, path) {
            (HttpMethod::Get, RECORDS_PATH) => {
                let records = match search_term(query) {
                    Some(term) => self.search(&term),
                    None => self.fetch_all(),
                };
                records.and_then(|r| encode_ok(&r))
            }
            (HttpMethod::Get, HEALTH_PATH) => self.health().and_then(|h| encode_ok(&h)),
            (HttpMethod::Put, path) => match parse_record_path(path) {
                Some(id) => self.handle_put(id, &request.body),
                None => Err(ServerError::NotFound(path.to_string())),
            },
            (_, path) => Err(ServerError::NotFound(path.to_string())),
        };

        result.unwrap_or_else(|err| {
            if err.is_server_error() {
                tracing::error!(error = %err, "request failed");
            }
            HttpResponse::error(err.status_code(), err.to_string())
        })
    }

    fn handle_put(&self, id: &str, body: &[u8]) -> ServerResult<HttpResponse> {
        let body: WriteBody =
            from_cbor(body).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        let response = self.write(body.into_request(id))?;
        response
            .to_http()
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

fn encode_ok<T: serde::Serialize>(body: &T) -> ServerResult<HttpResponse> {
    let bytes = to_cbor(body).map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(HttpResponse::new(200, bytes))
}

/// Splits `scheme://host/path?query` or `/path?query` into path and query.
fn split_target(url: &str) -> (&str, Option<&str>) {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let target = if url.contains("://") {
        without_scheme
            .find('/')
            .map_or("/", |i| &without_scheme[i..])
    } else {
        without_scheme
    };
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

fn search_term(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "q")
        .map(|(_, value)| value.replace('+', " "))
}
