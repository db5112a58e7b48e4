//! Reactive client store.
//!
//! The store is the single place presentation reads from. Every change is
//! expressed as a [`StoreAction`] run through the pure [`reduce`] function;
//! [`ClientStore::dispatch`] swaps in the new state and notifies
//! subscribers.

use parking_lot::{Mutex, RwLock};
use rostersync_protocol::{EditableField, GlobalVersion, Record};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// Snapshot of everything the client displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    /// Records in display order.
    pub records: Vec<Record>,
    /// Global version the records reflect.
    pub global_version: GlobalVersion,
    /// Set until the first load publishes records or an error.
    pub is_loading: bool,
    /// Set while a refresh is in flight.
    pub is_refreshing: bool,
    /// Last load or refresh error.
    pub error: Option<String>,
    /// Write errors keyed by record and field.
    pub field_errors: BTreeMap<(String, EditableField), String>,
}

impl ClientState {
    /// Returns the record with the given id.
    pub fn record(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Returns the write error for a field, if any.
    pub fn field_error(&self, id: &str, field: EditableField) -> Option<&str> {
        self.field_errors
            .get(&(id.to_string(), field))
            .map(String::as_str)
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            global_version: GlobalVersion::INITIAL,
            is_loading: true,
            is_refreshing: false,
            error: None,
            field_errors: BTreeMap::new(),
        }
    }
}

/// A state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Publishes a loaded record set. Clears the loading flag and error.
    SetRecords {
        /// The full record set.
        records: Vec<Record>,
        /// Version the set reflects.
        global_version: GlobalVersion,
    },
    /// Publishes a refreshed record set. Replaces the full set, clears the
    /// refreshing flag and error.
    MergeRecords {
        /// The full record set.
        records: Vec<Record>,
        /// Version the set reflects.
        global_version: GlobalVersion,
    },
    /// Replaces one record, or appends it if unknown.
    UpsertRecord(Record),
    /// Sets the global version.
    SetGlobalVersion(GlobalVersion),
    /// Sets the loading flag.
    SetLoading(bool),
    /// Sets the refreshing flag.
    SetRefreshing(bool),
    /// Sets or clears the error. Clears both busy flags.
    SetError(Option<String>),
    /// Records a write error against one field.
    SetFieldError {
        /// Record id.
        id: String,
        /// Field the write touched.
        field: EditableField,
        /// Error message.
        message: String,
    },
    /// Clears a field's write error.
    ClearFieldError {
        /// Record id.
        id: String,
        /// Field.
        field: EditableField,
    },
}

/// Computes the next state.
pub fn reduce(prev: &ClientState, action: StoreAction) -> ClientState {
    let mut next = prev.clone();
    match action {
        StoreAction::SetRecords {
            records,
            global_version,
        } => {
            next.records = records;
            next.global_version = global_version;
            next.is_loading = false;
            next.error = None;
        }
        StoreAction::MergeRecords {
            records,
            global_version,
        } => {
            next.records = records;
            next.global_version = global_version;
            next.is_refreshing = false;
            next.error = None;
        }
        StoreAction::UpsertRecord(record) => {
            match next.records.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => *slot = record,
                None => next.records.push(record),
            }
        }
        StoreAction::SetGlobalVersion(version) => next.global_version = version,
        StoreAction::SetLoading(loading) => next.is_loading = loading,
        StoreAction::SetRefreshing(refreshing) => next.is_refreshing = refreshing,
        StoreAction::SetError(error) => {
            next.error = error;
            next.is_loading = false;
            next.is_refreshing = false;
        }
        StoreAction::SetFieldError { id, field, message } => {
            next.field_errors.insert((id, field), message);
        }
        StoreAction::ClearFieldError { id, field } => {
            next.field_errors.remove(&(id, field));
        }
    }
    next
}

/// Observable holder of the current [`ClientState`].
pub struct ClientStore {
    state: RwLock<ClientState>,
    subscribers: Mutex<Vec<Sender<ClientState>>>,
}

impl ClientStore {
    /// Creates a store in the initial loading state.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ClientState::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Applies an action and notifies subscribers.
    pub fn dispatch(&self, action: StoreAction) {
        let next = {
            let mut state = self.state.write();
            let next = reduce(&state, action);
            *state = next.clone();
            next
        };
        self.subscribers
            .lock()
            .retain(|tx| tx.send(next.clone()).is_ok());
    }

    /// Returns a receiver that gets every subsequent state.
    pub fn subscribe(&self) -> Receiver<ClientState> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> ClientState {
        self.state.read().clone()
    }

    /// Returns the current records.
    pub fn records(&self) -> Vec<Record> {
        self.state.read().records.clone()
    }

    /// Returns one record.
    pub fn record(&self, id: &str) -> Option<Record> {
        self.state.read().record(id).cloned()
    }

    /// Returns the global version shown.
    pub fn global_version(&self) -> GlobalVersion {
        self.state.read().global_version
    }

    /// Returns the loading flag.
    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    /// Returns the refreshing flag.
    pub fn is_refreshing(&self) -> bool {
        self.state.read().is_refreshing
    }

    /// Returns the last error.
    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    /// Returns the write error for a field.
    pub fn field_error(&self, id: &str, field: EditableField) -> Option<String> {
        self.state.read().field_error(id, field).map(str::to_string)
    }
}

impl Default for ClientStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ClientStore")
            .field("records", &state.records.len())
            .field("global_version", &state.global_version)
            .field("is_loading", &state.is_loading)
            .field("is_refreshing", &state.is_refreshing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(id: &str, attendance: u8) -> Record {
        Record {
            id: id.to_string(),
            roll_number: format!("R-{id}"),
            name: format!("Student {id}"),
            blood_group: "O+".into(),
            class: "10".into(),
            section: "A".into(),
            phone: "555-0100".into(),
            email: format!("{id}@example.edu"),
            attendance,
            last_updated: "2024-01-15T08:00:00.000Z".into(),
        }
    }

    #[test]
    fn initial_state_is_loading() {
        let store = ClientStore::new();
        assert!(store.is_loading());
        assert!(!store.is_refreshing());
        assert_eq!(store.global_version(), GlobalVersion(1));
        assert!(store.records().is_empty());
    }

    #[test]
    fn set_records_clears_loading_and_error() {
        let mut state = ClientState {
            error: Some("offline".into()),
            ..ClientState::default()
        };
        state = reduce(
            &state,
            StoreAction::SetRecords {
                records: vec![record("a", 90)],
                global_version: GlobalVersion(4),
            },
        );
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
        assert_eq!(state.global_version, GlobalVersion(4));
    }

    #[test]
    fn merge_clears_refreshing() {
        let mut state = reduce(&ClientState::default(), StoreAction::SetRefreshing(true));
        state = reduce(
            &state,
            StoreAction::MergeRecords {
                records: vec![record("a", 90)],
                global_version: GlobalVersion(2),
            },
        );
        assert!(!state.is_refreshing);
        assert!(state.is_loading);
        assert_eq!(state.records.len(), 1);
    }

    #[test]
    fn set_error_clears_both_flags() {
        let mut state = reduce(&ClientState::default(), StoreAction::SetRefreshing(true));
        state = reduce(&state, StoreAction::SetError(Some("boom".into())));
        assert!(!state.is_loading);
        assert!(!state.is_refreshing);
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn upsert_replaces_in_place_or_appends() {
        let state = reduce(
            &ClientState::default(),
            StoreAction::SetRecords {
                records: vec![record("a", 90), record("b", 80)],
                global_version: GlobalVersion(2),
            },
        );
        let state = reduce(&state, StoreAction::UpsertRecord(record("a", 10)));
        assert_eq!(state.records[0].attendance, 10);
        assert_eq!(state.records.len(), 2);

        let state = reduce(&state, StoreAction::UpsertRecord(record("c", 70)));
        assert_eq!(state.records.len(), 3);
        assert_eq!(state.records[2].id, "c");
    }

    #[test]
    fn field_errors_set_and_clear() {
        let store = ClientStore::new();
        store.dispatch(StoreAction::SetFieldError {
            id: "a".into(),
            field: EditableField::Attendance,
            message: "too high".into(),
        });
        assert_eq!(
            store.field_error("a", EditableField::Attendance).as_deref(),
            Some("too high")
        );
        assert_eq!(store.field_error("a", EditableField::Name), None);

        store.dispatch(StoreAction::ClearFieldError {
            id: "a".into(),
            field: EditableField::Attendance,
        });
        assert_eq!(store.field_error("a", EditableField::Attendance), None);
    }

    #[test]
    fn subscribers_see_every_dispatch() {
        let store = ClientStore::new();
        let rx = store.subscribe();

        store.dispatch(StoreAction::SetLoading(false));
        store.dispatch(StoreAction::SetGlobalVersion(GlobalVersion(9)));

        assert!(!rx.recv().unwrap().is_loading);
        assert_eq!(rx.recv().unwrap().global_version, GlobalVersion(9));
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let store = ClientStore::new();
        drop(store.subscribe());
        store.dispatch(StoreAction::SetLoading(false));
        assert!(store.subscribers.lock().is_empty());
    }

    proptest! {
        #[test]
        fn reduce_is_pure(version in 1u64..1_000, loading: bool) {
            let prev = ClientState::default();
            let a = reduce(&prev, StoreAction::SetGlobalVersion(GlobalVersion(version)));
            let b = reduce(&prev, StoreAction::SetGlobalVersion(GlobalVersion(version)));
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(prev.global_version, GlobalVersion(1));

            let c = reduce(&a, StoreAction::SetLoading(loading));
            prop_assert_eq!(c.is_loading, loading);
            prop_assert_eq!(c.global_version, GlobalVersion(version));
        }
    }
}
