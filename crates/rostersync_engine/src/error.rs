//! Error types for the sync engine.

use rostersync_codec::CodecError;
use rostersync_protocol::{EditableField, GlobalVersion, ValidationError};
use rostersync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The edit was rejected locally or by the server's validation.
    #[error("invalid {}: {message}", scope_name(.field))]
    Validation {
        /// The offending field, if the error is field-scoped.
        field: Option<EditableField>,
        /// Error message.
        message: String,
    },

    /// The write was still stale after the forced resync.
    #[error("write rejected as stale; server at {server_version}")]
    StaleVersion {
        /// The server's version at the final rejection.
        server_version: GlobalVersion,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server has no record with this id.
    #[error("record not found: {id}")]
    NotFound {
        /// The missing id.
        id: String,
    },

    /// Another write to the same record has not settled yet.
    #[error("a write to {id} is already in flight")]
    WriteInFlight {
        /// The busy record.
        id: String,
    },

    /// Local cache failure.
    #[error("cache error: {0}")]
    Storage(#[from] StorageError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Protocol error (unexpected message or state).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

fn scope_name(field: &Option<EditableField>) -> &'static str {
    field.map_or("patch", |f| f.as_str())
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            _ => false,
        }
    }

    /// Returns the field a validation error is scoped to.
    pub fn field_scope(&self) -> Option<EditableField> {
        match self {
            SyncError::Validation { field, .. } => *field,
            _ => None,
        }
    }
}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Validation {
            field: err.field,
            message: err.message,
        }
    }
}
