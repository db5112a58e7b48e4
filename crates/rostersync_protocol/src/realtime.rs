//! Realtime channel events as seen by a connected client.

use crate::messages::RecordUpdated;
use std::time::Duration;

/// What a realtime session yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An accepted write.
    Update(RecordUpdated),
    /// `n` events were dropped because the session fell behind.
    ///
    /// Missed updates are not replayed; the client must refresh.
    Lagged(u64),
    /// The server closed the session.
    Closed,
    /// Nothing arrived (non-blocking receive or timeout).
    Idle,
}

/// A source of realtime events for one client session.
pub trait EventStream: Send {
    /// Waits up to `timeout` for the next event.
    fn next_event(&mut self, timeout: Duration) -> SessionEvent;

    /// Returns the next event without waiting.
    fn poll_event(&mut self) -> SessionEvent;
}
