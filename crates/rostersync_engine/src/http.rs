//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the sync engine.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, ureq, or the in-process loopback).

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use parking_lot::{Mutex, RwLock};
use rostersync_codec::{from_cbor, to_cbor};
use rostersync_protocol::{
    record_path, ErrorBody, FetchResponse, HttpRequest, HttpResponse, ProtocolError,
    TransportFailure, WriteRequest, WriteResponse, RECORDS_PATH,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// HTTP client abstraction.
///
/// Implementations own connection handling and must honour `timeout`,
/// reporting an expired request as [`TransportFailure::timeout`].
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: &HttpRequest, timeout: Duration)
        -> Result<HttpResponse, TransportFailure>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// HTTP-based sync transport.
///
/// Uses CBOR encoding for request/response bodies.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    timeout: Duration,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport with a 10 second timeout.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_secs(10),
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Creates a transport from a client configuration.
    pub fn from_config(config: &SyncConfig, client: C) -> Self {
        Self::new(config.server_url.clone(), client).with_timeout(config.request_timeout)
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        match self.client.send(&request, self.timeout) {
            Ok(response) => {
                *self.last_error.write() = None;
                Ok(response)
            }
            Err(failure) => {
                tracing::debug!(
                    method = request.method.as_str(),
                    url = %request.url,
                    error = %failure,
                    "request failed"
                );
                *self.last_error.write() = Some(failure.to_string());
                Err(failure)
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn fetch_all(&self) -> SyncResult<FetchResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let response = self
            .send(HttpRequest::get(self.url(RECORDS_PATH)))
            .map_err(|f| SyncError::Transport {
                retryable: f.kind.is_retryable(),
                message: f.to_string(),
            })?;

        if response.status != 200 {
            let message = from_cbor::<ErrorBody>(&response.body)
                .map(|b| b.message)
                .unwrap_or_default();
            return Err(SyncError::Transport {
                message: format!("server error {}: {message}", response.status),
                retryable: response.status >= 500,
            });
        }

        Ok(from_cbor(&response.body)?)
    }

    fn write(&self, request: &WriteRequest) -> Result<WriteResponse, TransportFailure> {
        if !self.is_connected() {
            return Err(TransportFailure::network("not connected to server"));
        }

        let body = to_cbor(&request.body())
            .map_err(|e| TransportFailure::decode(format!("failed to encode request: {e}")))?;
        let response = self.send(HttpRequest::put(self.url(&record_path(&request.id)), body))?;

        WriteResponse::from_http(&response).map_err(|err| match err {
            ProtocolError::UnexpectedStatus { status, message } => {
                TransportFailure::server(status, message)
            }
            ProtocolError::Codec(e) => TransportFailure::decode(e.to_string()),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Something that answers wire requests in-process.
///
/// Implemented for any `Fn(&HttpRequest) -> HttpResponse`, so a server is
/// attached with a closure:
///
/// ```rust,ignore
/// let client = LoopbackClient::new(move |req: &HttpRequest| server.handle_request(req));
/// ```
pub trait LoopbackServer: Send + Sync {
    /// Handles a request and returns the response.
    fn handle_request(&self, request: &HttpRequest) -> HttpResponse;
}

impl<F> LoopbackServer for F
where
    F: Fn(&HttpRequest) -> HttpResponse + Send + Sync,
{
    fn handle_request(&self, request: &HttpRequest) -> HttpResponse {
        self(request)
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead. The client can be
/// taken offline, and given an artificial latency; a latency above the
/// request timeout fails the request with a timeout.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    online: AtomicBool,
    latency: Mutex<Duration>,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            online: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Simulates losing or regaining the network.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Sets an artificial delay applied to every request.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportFailure::network("connection refused"));
        }

        let latency = *self.latency.lock();
        if latency > timeout {
            std::thread::sleep(timeout);
            return Err(TransportFailure::timeout(format!(
                "{} {} after {timeout:?}",
                request.method.as_str(),
                request.url
            )));
        }
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        Ok(self.server.handle_request(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rostersync_protocol::{GlobalVersion, HttpMethod, RecordPatch, TransportFailureKind};

    struct TestClient {
        response: RwLock<Option<HttpResponse>>,
        healthy: AtomicBool,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: RwLock::new(None),
                healthy: AtomicBool::new(true),
            }
        }

        fn set_response(&self, resp: HttpResponse) {
            *self.response.write() = Some(resp);
        }

        fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }
    }

    impl HttpClient for TestClient {
        fn send(
            &self,
            _request: &HttpRequest,
            _timeout: Duration,
        ) -> Result<HttpResponse, TransportFailure> {
            self.response
                .read()
                .clone()
                .ok_or_else(|| TransportFailure::network("No response set"))
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    fn request() -> WriteRequest {
        WriteRequest::new(
            "stu-001",
            RecordPatch {
                attendance: Some(80),
                ..RecordPatch::default()
            },
            GlobalVersion(3),
        )
    }

    #[test]
    fn transport_creation() {
        let transport = HttpTransport::new("https://roster.example.com/", TestClient::new());
        assert_eq!(transport.base_url(), "https://roster.example.com");
        assert!(transport.is_connected());
    }

    #[test]
    fn transport_not_connected_error() {
        let transport = HttpTransport::new("https://roster.example.com", TestClient::new());
        transport.close().unwrap();

        assert!(matches!(transport.fetch_all(), Err(SyncError::NotConnected)));
        let failure = transport.write(&request()).unwrap_err();
        assert_eq!(failure.kind, TransportFailureKind::Network);
    }

    #[test]
    fn transport_unhealthy_client() {
        let client = TestClient::new();
        client.set_healthy(false);
        let transport = HttpTransport::new("https://roster.example.com", client);
        assert!(!transport.is_connected());
    }

    #[test]
    fn fetch_decodes_body() {
        let client = TestClient::new();
        let body = FetchResponse::new(Vec::new(), GlobalVersion(7));
        client.set_response(HttpResponse::new(200, to_cbor(&body).unwrap()));

        let transport = HttpTransport::new("https://roster.example.com", client);
        assert_eq!(transport.fetch_all().unwrap(), body);
        assert_eq!(transport.last_error(), None);
    }

    #[test]
    fn fetch_server_error_is_retryable_transport() {
        let client = TestClient::new();
        client.set_response(HttpResponse::error(500, "Unable to fetch records"));

        let transport = HttpTransport::new("https://roster.example.com", client);
        let err = transport.fetch_all().unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Unable to fetch records"));
    }

    #[test]
    fn write_maps_conflict() {
        let client = TestClient::new();
        let stale = WriteResponse::StaleVersion {
            server_version: GlobalVersion(9),
        };
        client.set_response(stale.to_http().unwrap());

        let transport = HttpTransport::new("https://roster.example.com", client);
        assert_eq!(transport.write(&request()).unwrap(), stale);
    }

    #[test]
    fn write_500_is_transport_failure() {
        let client = TestClient::new();
        client.set_response(HttpResponse::error(503, "busy"));

        let transport = HttpTransport::new("https://roster.example.com", client);
        let failure = transport.write(&request()).unwrap_err();
        assert_eq!(failure.kind, TransportFailureKind::Server(503));
    }

    #[test]
    fn loopback_routes_to_closure() {
        let client = LoopbackClient::new(|req: &HttpRequest| {
            assert_eq!(req.method, HttpMethod::Get);
            assert_eq!(req.url, "http://loopback/api/records");
            let body = FetchResponse::new(Vec::new(), GlobalVersion(2));
            HttpResponse::new(200, to_cbor(&body).unwrap())
        });
        let transport = HttpTransport::new("http://loopback", client);
        assert_eq!(
            transport.fetch_all().unwrap().global_version,
            GlobalVersion(2)
        );
    }

    #[test]
    fn loopback_offline_and_timeout() {
        let client = LoopbackClient::new(|_: &HttpRequest| HttpResponse::new(200, Vec::new()));
        client.set_online(false);
        let failure = client
            .send(&HttpRequest::get("/health"), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(failure.kind, TransportFailureKind::Network);

        client.set_online(true);
        client.set_latency(Duration::from_millis(50));
        let failure = client
            .send(&HttpRequest::get("/health"), Duration::from_millis(5))
            .unwrap_err();
        assert_eq!(failure.kind, TransportFailureKind::Timeout);
    }
}
