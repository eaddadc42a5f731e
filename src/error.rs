use axum::{Json,
    http::StatusCode,
    response::IntoResponse
};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Multipart error: {0}")]
    MultipartError(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("File not found: {}", key)),
            StorageError::InvalidProvider(_) | StorageError::InvalidPath(_) => {
                AppError::BadRequest(err.to_string())
            }
            StorageError::Multipart(
                multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. },
            ) => AppError::PayloadTooLarge(err.to_string()),
            StorageError::Multipart(e) => AppError::MultipartError(e.to_string()),
            other => AppError::Storage(other),
        }
    }
}

/// Convert `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // Map application errors to HTTP status codes and messages
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::MultipartError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Storage(err) => {
                tracing::error!("Storage Error: {:}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage operation failed".to_string(),
                )
            }
        };

        // Return standardized JSON error response
        let body = Json(json!({"error": error_message}));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_http_statuses() {
        let status = |err: StorageError| AppError::from(err).into_response().status();

        assert_eq!(status(StorageError::NotFound("k".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(StorageError::InvalidProvider("ftp".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(StorageError::Multipart(multer::Error::FieldSizeExceeded {
                limit: 1,
                field_name: Some("file".into()),
            })),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status(StorageError::Backend("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
