use axum::{http::StatusCode, response::IntoResponse, response::Response};
use serde::Serialize;

use crate::common::types::now_ms;

/// Core error kinds (§7). Each variant maps to the HTTP outcome the
/// dispatcher is required to produce; workers log and advance instead of
/// propagating these past a single queue item.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("origin unreachable: {0}")]
    OriginUnreachable(String),

    #[error("cache full: entry of {size} bytes exceeds capacity {capacity}")]
    CacheFull { size: u64, capacity: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index persist failure: {0}")]
    IndexPersistFailure(String),
}

/// JSON error envelope returned to the client, matching the teacher's
/// timestamped error-response shape.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub timestamp: u64,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: message.into(),
            path: path.into(),
        }
    }
}

impl CacheError {
    /// The HTTP status the dispatcher surfaces for this error (§7).
    /// `CacheFull` is surfaced identically to `OriginUnreachable` to the
    /// client per spec; only the log message distinguishes them.
    pub fn status(&self) -> StatusCode {
        match self {
            CacheError::BadRequest(_) => StatusCode::NOT_FOUND,
            CacheError::OriginUnreachable(_) => StatusCode::BAD_GATEWAY,
            CacheError::CacheFull { .. } => StatusCode::BAD_GATEWAY,
            CacheError::Io(_) => StatusCode::BAD_GATEWAY,
            CacheError::IndexPersistFailure(_) => StatusCode::OK,
        }
    }
}

/// Wraps a `CacheError` with the request path so the JSON body can report it.
pub struct DispatchError {
    pub error: CacheError,
    pub path: String,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let body = ErrorBody::new(status, self.error.to_string(), self.path);
        (status, axum::Json(body)).into_response()
    }
}
