//! Error types for cache operations.

use rostersync_codec::CodecError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for cache operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot on disk could not be encoded or decoded.
    #[error("cache snapshot corrupted: {0}")]
    Codec(#[from] CodecError),

    /// Another process holds the cache directory.
    #[error("cache directory is locked: {}", path.display())]
    Locked {
        /// The locked directory.
        path: PathBuf,
    },

    /// No cached record has the given id.
    #[error("record not cached: {id}")]
    NotFound {
        /// The missing id.
        id: String,
    },
}

impl StorageError {
    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        StorageError::NotFound { id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            StorageError::not_found("stu-009").to_string(),
            "record not cached: stu-009"
        );
        let locked = StorageError::Locked {
            path: PathBuf::from("/tmp/cache"),
        };
        assert_eq!(locked.to_string(), "cache directory is locked: /tmp/cache");
    }

    #[test]
    fn io_converts() {
        let err: StorageError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
