//! Realtime fan-out of accepted writes.
//!
//! Every connected session owns a bounded queue. Publishing never blocks:
//! a full queue drops the event and counts it, and the session reports the
//! count as [`SessionEvent::Lagged`] on its next receive. There is no replay
//! buffer, so a lagged or reconnected client must refresh.
//!
//! # Usage
//!
//! ```rust
//! use rostersync_server::RealtimeHub;
//! use rostersync_protocol::SessionEvent;
//!
//! let hub = RealtimeHub::new(16);
//! let mut session = hub.connect();
//! assert_eq!(hub.session_count(), 1);
//! assert_eq!(session.try_recv(), SessionEvent::Idle);
//!
//! hub.disconnect(session.id());
//! assert_eq!(session.try_recv(), SessionEvent::Closed);
//! ```

use parking_lot::RwLock;
use rostersync_protocol::{EventStream, RecordUpdated, SessionEvent};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Identifies one realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Slot {
    id: SessionId,
    sender: SyncSender<RecordUpdated>,
    lagged: Arc<AtomicU64>,
}

/// Distributes [`RecordUpdated`] events to every connected session.
///
/// The hub:
/// - Delivers each event at most once per session
/// - Preserves publish order within a session
/// - Drops sessions whose receiver has gone away
/// - Is thread-safe
pub struct RealtimeHub {
    slots: RwLock<Vec<Slot>>,
    capacity: usize,
}

impl RealtimeHub {
    /// Creates a hub whose sessions each queue up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new session.
    pub fn connect(&self) -> RealtimeSession {
        let (sender, receiver) = mpsc::sync_channel(self.capacity);
        let lagged = Arc::new(AtomicU64::new(0));
        let id = SessionId::generate();

        self.slots.write().push(Slot {
            id,
            sender,
            lagged: Arc::clone(&lagged),
        });
        tracing::debug!(session = %id, "realtime session connected");

        RealtimeSession {
            id,
            receiver,
            lagged,
        }
    }

    /// Drops a session server-side. Returns true if it was connected.
    ///
    /// The session still drains events queued before the disconnect, then
    /// observes [`SessionEvent::Closed`].
    pub fn disconnect(&self, id: SessionId) -> bool {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        let removed = slots.len() != before;
        if removed {
            tracing::debug!(session = %id, "realtime session disconnected");
        }
        removed
    }

    /// Sends `event` to every connected session without blocking.
    ///
    /// Returns the number of sessions that queued the event.
    pub fn publish(&self, event: &RecordUpdated) -> usize {
        let mut delivered = 0;
        let mut slots = self.slots.write();
        slots.retain(|slot| match slot.sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                slot.lagged.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(session = %slot.id, "realtime session lagging, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    /// Returns the number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.slots.read().len()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// The receiving end of one realtime session.
pub struct RealtimeSession {
    id: SessionId,
    receiver: Receiver<RecordUpdated>,
    lagged: Arc<AtomicU64>,
}

impl RealtimeSession {
    /// Returns this session's id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Blocks until an event arrives or the session closes.
    pub fn recv(&mut self) -> SessionEvent {
        if let Some(event) = self.take_lagged() {
            return event;
        }
        match self.receiver.recv() {
            Ok(update) => SessionEvent::Update(update),
            Err(_) => SessionEvent::Closed,
        }
    }

    /// Waits up to `timeout` for an event.
    pub fn recv_timeout(&mut self, timeout: Duration) -> SessionEvent {
        if let Some(event) = self.take_lagged() {
            return event;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(update) => SessionEvent::Update(update),
            Err(RecvTimeoutError::Timeout) => SessionEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => SessionEvent::Closed,
        }
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> SessionEvent {
        if let Some(event) = self.take_lagged() {
            return event;
        }
        match self.receiver.try_recv() {
            Ok(update) => SessionEvent::Update(update),
            Err(TryRecvError::Empty) => SessionEvent::Idle,
            Err(TryRecvError::Disconnected) => SessionEvent::Closed,
        }
    }

    fn take_lagged(&self) -> Option<SessionEvent> {
        match self.lagged.swap(0, Ordering::SeqCst) {
            0 => None,
            n => Some(SessionEvent::Lagged(n)),
        }
    }
}

impl EventStream for RealtimeSession {
    fn next_event(&mut self, timeout: Duration) -> SessionEvent {
        self.recv_timeout(timeout)
    }

    fn poll_event(&mut self) -> SessionEvent {
        self.try_recv()
    }
}
