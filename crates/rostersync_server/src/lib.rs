//! # RosterSync Server
//!
//! The authoritative side of RosterSync.
//!
//! This crate provides:
//! - [`VersionAuthority`], the single global write counter
//! - [`RecordStore`] and an in-memory implementation
//! - The write path with stale-version rejection
//! - [`RealtimeHub`], which pushes every accepted write to connected sessions
//!
//! # Protocol
//!
//! A write carries the global version the client last saw:
//! 1. If it is behind the server's version, the server answers 409 with its
//!    own version and changes nothing
//! 2. Otherwise the patch is applied, the counter is bumped, and the new
//!    record is broadcast to every session, the writer's included
//!
//! The check, apply, bump, and broadcast happen under one lock.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod realtime;
mod seed;
mod server;
mod store;
mod version;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use realtime::{RealtimeHub, RealtimeSession, SessionId};
pub use seed::default_roster;
pub use server::SyncServer;
pub use store::{ensure_seed_data, MemoryRecordStore, RecordStore};
pub use version::{VersionAuthority, VersionGuard};
