//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use rostersync_protocol::{FetchResponse, TransportFailure, WriteRequest, WriteResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A sync transport handles communication with the record server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
///
/// `write` returns the raw outcome rather than a [`SyncResult`]: the
/// engine classifies it, and a transport failure must never be mistaken
/// for a stale-version rejection.
pub trait SyncTransport: Send + Sync {
    /// Fetches every record and the version they reflect.
    fn fetch_all(&self) -> SyncResult<FetchResponse>;

    /// Submits one write.
    fn write(&self, request: &WriteRequest) -> Result<WriteResponse, TransportFailure>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A scripted transport for testing.
///
/// Queued responses are returned first; once a queue is empty, fetches fall
/// back to the default snapshot and writes fail with a decode error.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    default_fetch: Mutex<Option<FetchResponse>>,
    fetch_queue: Mutex<VecDeque<SyncResult<FetchResponse>>>,
    write_queue: Mutex<VecDeque<Result<WriteResponse, TransportFailure>>>,
    writes: Mutex<Vec<WriteRequest>>,
    fetch_calls: AtomicUsize,
    write_delay: Mutex<Duration>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            default_fetch: Mutex::new(None),
            fetch_queue: Mutex::new(VecDeque::new()),
            write_queue: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
            write_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Sets the snapshot returned when no fetch is queued.
    pub fn set_fetch_response(&self, response: FetchResponse) {
        *self.default_fetch.lock() = Some(response);
    }

    /// Queues a one-shot fetch result.
    pub fn push_fetch(&self, result: SyncResult<FetchResponse>) {
        self.fetch_queue.lock().push_back(result);
    }

    /// Queues a one-shot write result.
    pub fn push_write(&self, result: Result<WriteResponse, TransportFailure>) {
        self.write_queue.lock().push_back(result);
    }

    /// Makes every write sleep before answering.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns how many fetches were made.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Returns how many writes were made.
    pub fn write_calls(&self) -> usize {
        self.writes.lock().len()
    }

    /// Returns every write request received, in order.
    pub fn writes(&self) -> Vec<WriteRequest> {
        self.writes.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTransport for MockTransport {
    fn fetch_all(&self) -> SyncResult<FetchResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(result) = self.fetch_queue.lock().pop_front() {
            return result;
        }
        self.default_fetch
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("No mock fetch response set".into()))
    }

    fn write(&self, request: &WriteRequest) -> Result<WriteResponse, TransportFailure> {
        if !self.is_connected() {
            return Err(TransportFailure::network("not connected"));
        }
        self.writes.lock().push(request.clone());

        let delay = *self.write_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.write_queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::decode("No mock write response set")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
