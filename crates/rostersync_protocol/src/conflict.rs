//! Write outcome classification.
//!
//! The write loop never inspects raw responses. Every attempt is reduced to a
//! [`WriteClassification`] by [`classify`], and the loop branches on that.

use crate::messages::WriteResponse;
use crate::record::Record;
use crate::version::GlobalVersion;
use std::fmt;

/// Why a request never produced a contract response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    /// Connection refused, reset, or unreachable.
    Network,
    /// The request did not complete in time.
    Timeout,
    /// The server answered with a status outside the contract.
    Server(u16),
    /// A response arrived but could not be decoded.
    Decode,
}

impl TransportFailureKind {
    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportFailureKind::Network | TransportFailureKind::Timeout => true,
            TransportFailureKind::Server(status) => *status >= 500,
            TransportFailureKind::Decode => false,
        }
    }
}

/// A request that failed below the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Failure category.
    pub kind: TransportFailureKind,
    /// Description.
    pub message: String,
}

impl TransportFailure {
    /// Creates a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Network,
            message: message.into(),
        }
    }

    /// Creates a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Timeout,
            message: message.into(),
        }
    }

    /// Creates a failure for an out-of-contract status.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Server(status),
            message: message.into(),
        }
    }

    /// Creates a decode failure.
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Decode,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportFailureKind::Network => write!(f, "network error: {}", self.message),
            TransportFailureKind::Timeout => write!(f, "timed out: {}", self.message),
            TransportFailureKind::Server(status) => {
                write!(f, "server error {status}: {}", self.message)
            }
            TransportFailureKind::Decode => write!(f, "bad response: {}", self.message),
        }
    }
}

impl std::error::Error for TransportFailure {}

/// What a single write attempt means to the write loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteClassification {
    /// The write was applied at `global_version`.
    Accepted {
        /// The record after the write.
        record: Record,
        /// The version assigned to the write.
        global_version: GlobalVersion,
    },
    /// The client was behind; resync to `server_version` and retry.
    StaleVersion {
        /// The server's authoritative version.
        server_version: GlobalVersion,
    },
    /// The request failed below the protocol.
    TransportError {
        /// Description.
        message: String,
        /// Whether retrying the same request may succeed.
        retryable: bool,
    },
    /// The server rejected the patch.
    ValidationError {
        /// Server message.
        message: String,
    },
    /// The record does not exist on the server.
    NotFound {
        /// Server message.
        message: String,
    },
}

impl WriteClassification {
    /// Returns true for [`WriteClassification::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, WriteClassification::Accepted { .. })
    }

    /// Returns true if the write loop should resync and retry.
    pub fn is_stale(&self) -> bool {
        matches!(self, WriteClassification::StaleVersion { .. })
    }
}

/// Classifies the outcome of a write attempt made at `client_version`.
///
/// The server is authoritative: a 409 is stale even when its reported
/// version does not exceed `client_version`.
pub fn classify(
    client_version: GlobalVersion,
    outcome: Result<WriteResponse, TransportFailure>,
) -> WriteClassification {
    match outcome {
        Ok(WriteResponse::Accepted {
            record,
            global_version,
        }) => WriteClassification::Accepted {
            record,
            global_version,
        },
        Ok(WriteResponse::StaleVersion { server_version }) => {
            if server_version <= client_version {
                tracing::warn!(
                    client = %client_version,
                    server = %server_version,
                    "stale rejection without a newer server version"
                );
            }
            WriteClassification::StaleVersion { server_version }
        }
        Ok(WriteResponse::Invalid { message }) => WriteClassification::ValidationError { message },
        Ok(WriteResponse::NotFound { message }) => WriteClassification::NotFound { message },
        Err(failure) => WriteClassification::TransportError {
            retryable: failure.kind.is_retryable(),
            message: failure.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            id: "stu-001".into(),
            roll_number: "R001".into(),
            name: "Aarav Shah".into(),
            blood_group: "O+".into(),
            class: "10".into(),
            section: "A".into(),
            phone: "555-0101".into(),
            email: "aarav@example.edu".into(),
            attendance: 92,
            last_updated: "2024-03-01T09:00:00.000Z".into(),
        }
    }

    #[test]
    fn accepted_passes_through() {
        let class = classify(
            GlobalVersion(5),
            Ok(WriteResponse::Accepted {
                record: record(),
                global_version: GlobalVersion(6),
            }),
        );
        assert!(class.is_accepted());
        match class {
            WriteClassification::Accepted { global_version, .. } => {
                assert_eq!(global_version, GlobalVersion(6))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn conflict_is_stale() {
        let class = classify(
            GlobalVersion(5),
            Ok(WriteResponse::StaleVersion {
                server_version: GlobalVersion(7),
            }),
        );
        assert_eq!(
            class,
            WriteClassification::StaleVersion {
                server_version: GlobalVersion(7)
            }
        );
    }

    #[test]
    fn conflict_without_newer_version_is_still_stale() {
        let class = classify(
            GlobalVersion(9),
            Ok(WriteResponse::StaleVersion {
                server_version: GlobalVersion(9),
            }),
        );
        assert!(class.is_stale());
    }

    #[test]
    fn timeout_is_transport_error_not_stale() {
        let class = classify(
            GlobalVersion(3),
            Err(TransportFailure::timeout("no answer after 10s")),
        );
        match class {
            WriteClassification::TransportError { retryable, message } => {
                assert!(retryable);
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_failure_is_not_retryable() {
        let class = classify(GlobalVersion(3), Err(TransportFailure::decode("garbage")));
        assert_eq!(
            class,
            WriteClassification::TransportError {
                message: "bad response: garbage".into(),
                retryable: false,
            }
        );
    }

    #[test]
    fn server_status_retryability() {
        assert!(TransportFailureKind::Server(503).is_retryable());
        assert!(!TransportFailureKind::Server(418).is_retryable());
    }

    #[test]
    fn invalid_and_not_found() {
        assert_eq!(
            classify(
                GlobalVersion(1),
                Ok(WriteResponse::Invalid {
                    message: "Attendance must be between 0 and 100".into()
                })
            ),
            WriteClassification::ValidationError {
                message: "Attendance must be between 0 and 100".into()
            }
        );
        assert_eq!(
            classify(
                GlobalVersion(1),
                Ok(WriteResponse::NotFound {
                    message: "Student not found".into()
                })
            ),
            WriteClassification::NotFound {
                message: "Student not found".into()
            }
        );
    }
}
