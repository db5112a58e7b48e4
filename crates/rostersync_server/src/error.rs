//! Error types for the record server.

use rostersync_protocol::GlobalVersion;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the record server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// The request failed validation or could not be decoded.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No record has the given id.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The client's version is behind the server's.
    #[error("stale version: client at {client}, server at {server}")]
    StaleVersion {
        /// Version the client submitted.
        client: GlobalVersion,
        /// The server's current version.
        server: GlobalVersion,
    },

    /// The record store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the HTTP-like status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::NotFound(_) => 404,
            ServerError::StaleVersion { .. } => 409,
            ServerError::Storage(_) | ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::NotFound("stu-404".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(ServerError::Storage("disk".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        let stale = ServerError::StaleVersion {
            client: GlobalVersion(5),
            server: GlobalVersion(6),
        };
        assert_eq!(stale.status_code(), 409);
        assert_eq!(ServerError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ServerError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(ServerError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn error_display() {
        let err = ServerError::StaleVersion {
            client: GlobalVersion(5),
            server: GlobalVersion(6),
        };
        assert_eq!(err.to_string(), "stale version: client at v5, server at v6");
    }
}
