//! Protocol messages exchanged between clients and the server.
//!
//! The wire contract, independent of transport:
//!
//! ```text
//! GET  /api/records        -> 200 {records, globalVersion}
//! PUT  /api/records/{id}   -> 200 {record, globalVersion}
//!                           | 409 {serverVersion}
//!                           | 404 {message}
//!                           | 400 {message}
//! GET  /health             -> 200 {status, globalVersion, recordCount, connectedSessions}
//! ```
//!
//! Bodies are CBOR. Realtime pushes carry [`RecordUpdated`].

use crate::record::{Record, RecordPatch};
use crate::version::GlobalVersion;
use rostersync_codec::{from_cbor, to_cbor, CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Collection endpoint.
pub const RECORDS_PATH: &str = "/api/records";
/// Health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Returns the endpoint of a single record.
pub fn record_path(id: &str) -> String {
    format!("{RECORDS_PATH}/{id}")
}

/// Extracts the record id from a single-record endpoint.
pub fn parse_record_path(path: &str) -> Option<&str> {
    path.strip_prefix(RECORDS_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

/// Errors while interpreting a wire response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The server answered with a status this contract does not define.
    #[error("unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP-like status code.
        status: u16,
        /// Server-provided message, if any.
        message: String,
    },
}

/// Result of a full fetch: every record plus the version it reflects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    /// All records, ordered by roll number.
    pub records: Vec<Record>,
    /// The global version the record set reflects.
    pub global_version: GlobalVersion,
}

impl FetchResponse {
    /// Creates a new fetch response.
    pub fn new(records: Vec<Record>, global_version: GlobalVersion) -> Self {
        Self {
            records,
            global_version,
        }
    }
}

/// A write submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    /// Target record.
    pub id: String,
    /// Fields to change.
    pub patch: RecordPatch,
    /// The global version the client last observed.
    pub client_version: GlobalVersion,
}

impl WriteRequest {
    /// Creates a new write request.
    pub fn new(id: impl Into<String>, patch: RecordPatch, client_version: GlobalVersion) -> Self {
        Self {
            id: id.into(),
            patch,
            client_version,
        }
    }

    /// Returns the body sent with `PUT /api/records/{id}`.
    pub fn body(&self) -> WriteBody {
        WriteBody {
            patch: self.patch.clone(),
            client_version: self.client_version,
        }
    }
}

/// Body of `PUT /api/records/{id}`; the id travels in the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteBody {
    /// Fields to change.
    pub patch: RecordPatch,
    /// The global version the client last observed.
    pub client_version: GlobalVersion,
}

impl WriteBody {
    /// Re-attaches the id from the path.
    pub fn into_request(self, id: impl Into<String>) -> WriteRequest {
        WriteRequest::new(id, self.patch, self.client_version)
    }
}

/// The server's answer to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResponse {
    /// 200: applied; carries the post-write record and the new version.
    Accepted {
        /// The record after the write.
        record: Record,
        /// The version assigned to this write.
        global_version: GlobalVersion,
    },
    /// 409: the client's version is behind; nothing was applied.
    StaleVersion {
        /// The server's authoritative version.
        server_version: GlobalVersion,
    },
    /// 404: no record with that id.
    NotFound {
        /// Server message.
        message: String,
    },
    /// 400: the patch failed server-side validation.
    Invalid {
        /// Server message.
        message: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedBody {
    record: Record,
    global_version: GlobalVersion,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaleBody {
    server_version: GlobalVersion,
}

/// Error body used by 400, 404, and 500 responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub message: String,
}

impl WriteResponse {
    /// Returns the HTTP-like status code of this response.
    pub fn status_code(&self) -> u16 {
        match self {
            WriteResponse::Accepted { .. } => 200,
            WriteResponse::Invalid { .. } => 400,
            WriteResponse::NotFound { .. } => 404,
            WriteResponse::StaleVersion { .. } => 409,
        }
    }

    /// Renders this response as a status code and CBOR body.
    pub fn to_http(&self) -> CodecResult<HttpResponse> {
        let body = match self {
            WriteResponse::Accepted {
                record,
                global_version,
            } => to_cbor(&AcceptedBody {
                record: record.clone(),
                global_version: *global_version,
            })?,
            WriteResponse::StaleVersion { server_version } => to_cbor(&StaleBody {
                server_version: *server_version,
            })?,
            WriteResponse::NotFound { message } | WriteResponse::Invalid { message } => {
                to_cbor(&ErrorBody {
                    message: message.clone(),
                })?
            }
        };
        Ok(HttpResponse::new(self.status_code(), body))
    }

    /// Parses a status code and CBOR body.
    ///
    /// # Errors
    ///
    /// Statuses outside the write contract (e.g. 500) are returned as
    /// [`ProtocolError::UnexpectedStatus`].
    pub fn from_http(response: &HttpResponse) -> Result<Self, ProtocolError> {
        match response.status {
            200 => {
                let body: AcceptedBody = from_cbor(&response.body)?;
                Ok(WriteResponse::Accepted {
                    record: body.record,
                    global_version: body.global_version,
                })
            }
            409 => {
                let body: StaleBody = from_cbor(&response.body)?;
                Ok(WriteResponse::StaleVersion {
                    server_version: body.server_version,
                })
            }
            400 => Ok(WriteResponse::Invalid {
                message: error_message(response),
            }),
            404 => Ok(WriteResponse::NotFound {
                message: error_message(response),
            }),
            status => Err(ProtocolError::UnexpectedStatus {
                status,
                message: error_message(response),
            }),
        }
    }
}

fn error_message(response: &HttpResponse) -> String {
    from_cbor::<ErrorBody>(&response.body)
        .map(|b| b.message)
        .unwrap_or_else(|_| format!("status {}", response.status))
}

/// Realtime event broadcast after every accepted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdated {
    /// The full record after the write.
    pub record: Record,
    /// The version assigned to the write.
    pub global_version: GlobalVersion,
}

impl RecordUpdated {
    /// Creates a new event.
    pub fn new(record: Record, global_version: GlobalVersion) -> Self {
        Self {
            record,
            global_version,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Always `"ok"` when the server answers.
    pub status: String,
    /// Current global version.
    pub global_version: GlobalVersion,
    /// Number of records in the store.
    pub record_count: usize,
    /// Number of connected realtime sessions.
    pub connected_sessions: usize,
}

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read.
    Get,
    /// Replace/patch.
    Put,
}

impl HttpMethod {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
        }
    }
}

/// A transport-agnostic request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL or path.
    pub url: String,
    /// CBOR body (empty for GET).
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: Vec::new(),
        }
    }

    /// Creates a PUT request.
    pub fn put(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Put,
            url: url.into(),
            body,
        }
    }
}

/// A transport-agnostic response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP-like status code.
    pub status: u16,
    /// CBOR body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Creates an error response with a CBOR [`ErrorBody`].
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let body = to_cbor(&ErrorBody {
            message: message.into(),
        })
        .unwrap_or_default();
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            id: "stu-004".into(),
            roll_number: "R004".into(),
            name: "Meera Iyer".into(),
            blood_group: "B+".into(),
            class: "9".into(),
            section: "C".into(),
            phone: "555-0104".into(),
            email: "meera@example.edu".into(),
            attendance: 71,
            last_updated: "2024-03-02T10:00:00.000Z".into(),
        }
    }

    #[test]
    fn record_paths() {
        assert_eq!(record_path("stu-1"), "/api/records/stu-1");
        assert_eq!(parse_record_path("/api/records/stu-1"), Some("stu-1"));
        assert_eq!(parse_record_path("/api/records/"), None);
        assert_eq!(parse_record_path("/api/records"), None);
        assert_eq!(parse_record_path("/api/records/a/b"), None);
        assert_eq!(parse_record_path("/health"), None);
    }

    #[test]
    fn status_codes() {
        let accepted = WriteResponse::Accepted {
            record: record(),
            global_version: GlobalVersion(6),
        };
        assert_eq!(accepted.status_code(), 200);
        assert_eq!(
            WriteResponse::StaleVersion {
                server_version: GlobalVersion(6)
            }
            .status_code(),
            409
        );
        assert_eq!(
            WriteResponse::NotFound {
                message: "gone".into()
            }
            .status_code(),
            404
        );
        assert_eq!(
            WriteResponse::Invalid {
                message: "bad".into()
            }
            .status_code(),
            400
        );
    }

    #[test]
    fn stale_response_carries_server_version() {
        let response = WriteResponse::StaleVersion {
            server_version: GlobalVersion(8),
        };
        let http = response.to_http().unwrap();
        assert_eq!(http.status, 409);
        assert_eq!(WriteResponse::from_http(&http).unwrap(), response);
    }

    #[test]
    fn accepted_response_over_http() {
        let response = WriteResponse::Accepted {
            record: record(),
            global_version: GlobalVersion(12),
        };
        let parsed = WriteResponse::from_http(&response.to_http().unwrap()).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn server_error_is_unexpected_status() {
        let http = HttpResponse::error(500, "database unavailable");
        let err = WriteResponse::from_http(&http).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedStatus {
                status: 500,
                message: "database unavailable".into()
            }
        );
    }

    #[test]
    fn error_body_falls_back_to_status() {
        let http = HttpResponse::new(404, Vec::new());
        assert_eq!(
            WriteResponse::from_http(&http).unwrap(),
            WriteResponse::NotFound {
                message: "status 404".into()
            }
        );
    }

    #[test]
    fn write_body_keeps_id_in_path() {
        let request = WriteRequest::new("stu-004", RecordPatch::default(), GlobalVersion(3));
        let body = request.body();
        assert_eq!(body.client_version, GlobalVersion(3));
        assert_eq!(body.into_request("stu-004"), request);
    }
}
