//! # RosterSync Engine
//!
//! The client half of RosterSync.
//!
//! This crate provides:
//! - [`SyncEngine`] with the load, refresh, and write protocols
//! - [`ClientStore`], the reactive state presentation reads from
//! - [`SyncTransport`] with HTTP, loopback, and mock implementations
//! - [`RealtimeListener`], which merges broadcast updates
//!
//! ## Architecture
//!
//! The engine is **cache-first**: a load shows whatever the local cache
//! holds and refreshes from the server in the background. Writes are
//! **optimistic**: each carries the global version the client last saw,
//! and a stale rejection is repaired with one resync and one retry.
//!
//! ## Key Invariants
//!
//! - The server is authoritative
//! - Results are reconciled by version, never by arrival order
//! - At most two write attempts and one resync per edit
//! - Failures never discard displayed data

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod realtime;
mod store;
mod transport;

pub use config::SyncConfig;
pub use engine::{
    ApplyOutcome, LoadOutcome, LoadSource, RefreshHandle, RefreshOutcome, SyncEngine, SyncStats,
    MAX_WRITE_ATTEMPTS,
};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use realtime::{drain, DrainSummary, ListenerHandle, RealtimeListener, POLL_INTERVAL};
pub use store::{reduce, ClientState, ClientStore, StoreAction};
pub use transport::{MockTransport, SyncTransport};
