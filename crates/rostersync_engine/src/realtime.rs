//! Client side of the realtime channel.

use crate::engine::{ApplyOutcome, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use rostersync_protocol::{EventStream, SessionEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long the listener blocks before re-checking its stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a listener or a drain did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Updates merged into the store.
    pub applied: u64,
    /// Updates ignored as echoes or older than local state.
    pub ignored: u64,
    /// Events the session reported as dropped.
    pub lagged: u64,
    /// Whether the server closed the session.
    pub closed: bool,
}

/// Feeds a realtime session into an engine on a background thread.
pub struct RealtimeListener;

impl RealtimeListener {
    /// Starts listening.
    ///
    /// Updates go through [`SyncEngine::apply_remote`]. A lag report runs
    /// [`SyncEngine::on_reconnect`]. The thread exits when the session closes
    /// or the handle is stopped.
    pub fn spawn<T, S>(engine: SyncEngine<T>, mut stream: S) -> ListenerHandle
    where
        T: SyncTransport + 'static,
        S: EventStream + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = std::thread::spawn(move || {
            let mut summary = DrainSummary::default();
            while !flag.load(Ordering::SeqCst) {
                let event = stream.next_event(POLL_INTERVAL);
                if !handle_event(&engine, event, &mut summary) {
                    break;
                }
            }
            tracing::debug!(
                client = %engine.config().client_name,
                applied = summary.applied,
                ignored = summary.ignored,
                "realtime listener stopped"
            );
            summary
        });

        ListenerHandle {
            stop,
            thread: Some(thread),
        }
    }
}

/// Handle to a running [`RealtimeListener`].
///
/// Dropping the handle stops the listener without waiting for it.
pub struct ListenerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<DrainSummary>>,
}

impl ListenerHandle {
    /// Stops the listener and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Protocol`] if the listener thread panicked.
    pub fn stop(mut self) -> SyncResult<DrainSummary> {
        self.stop.store(true, Ordering::SeqCst);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| SyncError::Protocol("realtime listener panicked".into())),
            None => Ok(DrainSummary::default()),
        }
    }

    /// Returns true once the listener has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Applies every event already queued on `stream`, without blocking.
pub fn drain<T, S>(engine: &SyncEngine<T>, stream: &mut S) -> DrainSummary
where
    T: SyncTransport + 'static,
    S: EventStream + ?Sized,
{
    let mut summary = DrainSummary::default();
    loop {
        let event = stream.poll_event();
        if matches!(event, SessionEvent::Idle) || !handle_event(engine, event, &mut summary) {
            return summary;
        }
    }
}

/// Returns false when the session is over.
fn handle_event<T>(engine: &SyncEngine<T>, event: SessionEvent, summary: &mut DrainSummary) -> bool
where
    T: SyncTransport + 'static,
{
    match event {
        SessionEvent::Update(update) => match engine.apply_remote(&update) {
            ApplyOutcome::Applied => summary.applied += 1,
            ApplyOutcome::Ignored => summary.ignored += 1,
        },
        SessionEvent::Lagged(missed) => {
            summary.lagged += missed;
            tracing::warn!(
                client = %engine.config().client_name,
                missed,
                "realtime session lagged; refreshing"
            );
            if let Err(err) = engine.on_reconnect() {
                tracing::warn!(client = %engine.config().client_name, error = %err, "refresh after lag failed");
            }
        }
        SessionEvent::Closed => {
            summary.closed = true;
            return false;
        }
        SessionEvent::Idle => {}
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::transport::MockTransport;
    use rostersync_protocol::{FetchResponse, GlobalVersion, Record, RecordUpdated};
    use rostersync_storage::MemoryCache;
    use std::collections::VecDeque;

    struct ScriptedStream(VecDeque<SessionEvent>);

    impl EventStream for ScriptedStream {
        fn next_event(&mut self, timeout: Duration) -> SessionEvent {
            match self.0.pop_front() {
                Some(event) => event,
                None => {
                    std::thread::sleep(timeout);
                    SessionEvent::Idle
                }
            }
        }

        fn poll_event(&mut self) -> SessionEvent {
            self.0.pop_front().unwrap_or(SessionEvent::Idle)
        }
    }

    fn record(id: &str, attendance: u8) -> Record {
        Record {
            id: id.to_string(),
            roll_number: format!("R-{id}"),
            name: format!("Student {id}"),
            blood_group: "A-".into(),
            class: "11".into(),
            section: "B".into(),
            phone: "555-0142".into(),
            email: format!("{id}@example.edu"),
            attendance,
            last_updated: "2024-01-15T08:00:00.000Z".into(),
        }
    }

    fn engine() -> SyncEngine<MockTransport> {
        let transport = MockTransport::new();
        transport.set_fetch_response(FetchResponse::new(vec![record("a", 50)], GlobalVersion(3)));
        let engine = SyncEngine::new(
            SyncConfig::default().with_refresh_on_load(false),
            transport,
            Arc::new(MemoryCache::new()),
        );
        engine.load().unwrap();
        engine
    }

    fn update(attendance: u8, version: u64) -> SessionEvent {
        SessionEvent::Update(RecordUpdated::new(
            record("a", attendance),
            GlobalVersion(version),
        ))
    }

    #[test]
    fn drain_applies_until_idle() {
        let engine = engine();
        let mut stream = ScriptedStream(VecDeque::from([update(60, 4), update(55, 4)]));

        let summary = drain(&engine, &mut stream);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.ignored, 1);
        assert!(!summary.closed);
        assert_eq!(engine.store().record("a").unwrap().attendance, 60);
    }

    #[test]
    fn lag_triggers_refresh() {
        let engine = engine();
        let fetches = engine.transport().fetch_calls();
        let mut stream = ScriptedStream(VecDeque::from([SessionEvent::Lagged(3)]));

        let summary = drain(&engine, &mut stream);
        assert_eq!(summary.lagged, 3);
        assert_eq!(engine.transport().fetch_calls(), fetches + 1);
    }

    #[test]
    fn listener_exits_on_close() {
        let engine = engine();
        let stream = ScriptedStream(VecDeque::from([update(70, 5), SessionEvent::Closed]));

        let handle = RealtimeListener::spawn(engine.clone(), stream);
        while !handle.is_finished() {
            std::thread::sleep(Duration::from_millis(5));
        }
        let summary = handle.stop().unwrap();
        assert!(summary.closed);
        assert_eq!(summary.applied, 1);
        assert_eq!(engine.global_version(), GlobalVersion(5));
    }

    #[test]
    fn listener_stops_on_request() {
        let handle = RealtimeListener::spawn(engine(), ScriptedStream(VecDeque::new()));
        let summary = handle.stop().unwrap();
        assert!(!summary.closed);
    }
}
