//! # RosterSync Testkit
//!
//! Test utilities for RosterSync.
//!
//! This crate provides:
//! - [`TestCluster`]: one in-process server plus loopback clients
//! - [`FlakyTransport`]: a transport wrapper that fails on demand
//! - Property-based test generators using proptest
//! - Concurrent-writer stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rostersync_testkit::prelude::*;
//!
//! #[test]
//! fn writes_converge() {
//!     let cluster = TestCluster::at_version(5, 3);
//!     cluster.load_all();
//!     // ... race writes, then drain sessions
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::transport::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use transport::*;
