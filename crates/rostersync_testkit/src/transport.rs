//! Fault injection for sync transports.

use parking_lot::Mutex;
use rostersync_engine::{SyncError, SyncResult, SyncTransport};
use rostersync_protocol::{FetchResponse, TransportFailure, WriteRequest, WriteResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Wraps a transport and fails calls on demand.
///
/// Queued failures are consumed one per call; once the queues are empty,
/// calls pass through to the inner transport.
pub struct FlakyTransport<T> {
    inner: T,
    offline: AtomicBool,
    fetch_failures: Mutex<VecDeque<SyncError>>,
    write_failures: Mutex<VecDeque<TransportFailure>>,
    fetches: AtomicUsize,
    writes: AtomicUsize,
}

impl<T: SyncTransport> FlakyTransport<T> {
    /// Wraps `inner`.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
            fetch_failures: Mutex::new(VecDeque::new()),
            write_failures: Mutex::new(VecDeque::new()),
            fetches: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Fails the next `n` fetches with a retryable transport error.
    pub fn fail_next_fetches(&self, n: usize) {
        let mut queue = self.fetch_failures.lock();
        for _ in 0..n {
            queue.push_back(SyncError::transport_retryable("injected fetch failure"));
        }
    }

    /// Fails the next write with `failure`.
    pub fn fail_next_write(&self, failure: TransportFailure) {
        self.write_failures.lock().push_back(failure);
    }

    /// Fails every call until set back online.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fetches that reached the inner transport.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Writes that reached the inner transport.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<T: SyncTransport> SyncTransport for FlakyTransport<T> {
    fn fetch_all(&self) -> SyncResult<FetchResponse> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("network unreachable"));
        }
        if let Some(err) = self.fetch_failures.lock().pop_front() {
            return Err(err);
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_all()
    }

    fn write(&self, request: &WriteRequest) -> Result<WriteResponse, TransportFailure> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportFailure::network("network unreachable"));
        }
        if let Some(failure) = self.write_failures.lock().pop_front() {
            return Err(failure);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(request)
    }

    fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst) && self.inner.is_connected()
    }

    fn close(&self) -> SyncResult<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{loopback_transport, test_config, test_server};
    use rostersync_engine::{LoadSource, SyncEngine};
    use rostersync_protocol::{GlobalVersion, RecordPatch};
    use rostersync_storage::MemoryCache;
    use std::sync::Arc;

    fn flaky_client(
        server: &Arc<rostersync_server::SyncServer>,
    ) -> SyncEngine<FlakyTransport<crate::fixtures::LoopbackTransport>> {
        SyncEngine::new(
            test_config("flaky"),
            FlakyTransport::new(loopback_transport(server)),
            Arc::new(MemoryCache::new()),
        )
    }

    fn attendance(value: u8) -> RecordPatch {
        RecordPatch {
            attendance: Some(value),
            ..RecordPatch::default()
        }
    }

    #[test]
    fn failed_load_recovers_on_refresh() {
        let server = test_server(2);
        let client = flaky_client(&server);
        client.transport().fail_next_fetches(1);

        assert_eq!(client.load().unwrap().source, LoadSource::CacheFallback);
        assert!(client.store().error().is_some());

        assert!(client.refresh().unwrap().is_applied());
        assert_eq!(client.store().records().len(), 10);
        assert_eq!(client.store().error(), None);
    }

    #[test]
    fn injected_write_failure_leaves_state_intact() {
        let server = test_server(1);
        let client = flaky_client(&server);
        client.load().unwrap();
        let before = client.store().records();

        client
            .transport()
            .fail_next_write(TransportFailure::server(503, "unavailable"));
        let err = client.write("stu-001", attendance(10)).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(client.store().records(), before);
        assert_eq!(server.global_version(), GlobalVersion(1));

        client.write("stu-001", attendance(10)).unwrap();
        assert_eq!(client.transport().writes(), 1);
    }

    #[test]
    fn offline_refresh_keeps_records() {
        let server = test_server(1);
        let client = flaky_client(&server);
        client.load().unwrap();

        client.transport().set_offline(true);
        assert!(client.refresh().is_err());
        assert_eq!(client.store().records().len(), 10);
        assert!(!client.store().is_refreshing());
    }
}
