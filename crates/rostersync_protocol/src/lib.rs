//! # RosterSync Protocol
//!
//! Shared vocabulary for RosterSync clients and servers.
//!
//! This crate provides:
//! - [`Record`], [`RecordPatch`], and field validation
//! - [`GlobalVersion`], the server-wide write counter
//! - Wire messages for fetch, write, health, and realtime events
//! - [`EventStream`], the client's view of a realtime session
//! - [`classify`], which reduces a write attempt to a [`WriteClassification`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod messages;
mod realtime;
mod record;
mod version;

pub use conflict::{classify, TransportFailure, TransportFailureKind, WriteClassification};
pub use messages::{
    parse_record_path, record_path, ErrorBody, FetchResponse, HealthStatus, HttpMethod,
    HttpRequest, HttpResponse, ProtocolError, RecordUpdated, WriteBody, WriteRequest,
    WriteResponse, HEALTH_PATH, RECORDS_PATH,
};
pub use realtime::{EventStream, SessionEvent};
pub use record::{EditableField, Record, RecordPatch, ValidationError, MAX_ATTENDANCE};
pub use version::GlobalVersion;
