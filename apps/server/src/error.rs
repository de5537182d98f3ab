//! JSON error responses

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use emufetch_core::AcquireError;
use emufetch_types::ErrorKind;
use serde::Serialize;

/// Failure body: `{ error, details, retryable }`
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: ErrorKind,
    pub details: String,
    pub retryable: bool,
}

impl ApiError {
    /// A request rejected before it reached the core
    pub fn bad_request(details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ErrorKind::InvalidRequest,
            details: details.into(),
            retryable: false,
        }
    }
}

/// HTTP status for each failure kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::MissingFileId | ErrorKind::UnsupportedFormat => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Network | ErrorKind::ConfirmationTokenNotFound => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AcquireError> for ApiError {
    fn from(err: AcquireError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            error: kind,
            details: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::MissingFileId), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::ConfirmationTokenNotFound), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::NoFilesExtracted), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn body_carries_kind_and_details() {
        let api: ApiError = AcquireError::NotFound(PathBuf::from("/tmp/missing.zip")).into();
        let body = serde_json::to_value(&api).unwrap();

        assert_eq!(body["error"], "NotFound");
        assert_eq!(body["retryable"], false);
        assert!(body["details"].as_str().unwrap().contains("missing.zip"));
        assert!(body.get("status").is_none());
    }
}
