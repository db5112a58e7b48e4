//! # RosterSync Storage
//!
//! Client-local record cache for RosterSync.
//!
//! The cache lets a client render its last-known records immediately on
//! startup, before the server has answered. It mirrors the server and is
//! never a source of truth.
//!
//! ## Available Caches
//!
//! - [`MemoryCache`] - For tests and ephemeral clients
//! - [`FileCache`] - Durable CBOR snapshot guarded by an advisory lock
//!
//! ## Example
//!
//! ```rust
//! use rostersync_storage::{MemoryCache, RecordCache};
//!
//! let cache = MemoryCache::new();
//! assert!(cache.get_all().unwrap().is_empty());
//! assert!(cache.get_by_id("stu-001").unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod error;
mod file;
mod memory;

pub use cache::{CacheSnapshot, RecordCache};
pub use error::{StorageError, StorageResult};
pub use file::{CacheConfig, FileCache};
pub use memory::MemoryCache;
