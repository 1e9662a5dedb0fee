use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::error::StorageError;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            StorageError::DuplicateContent(_) | StorageError::ChunkMissing { .. } => {
                StatusCode::CONFLICT
            }
            StorageError::IntegrityMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            StorageError::InvalidIdentifier(_) | StorageError::InvalidDescriptor(_) => {
                StatusCode::BAD_REQUEST
            }
            StorageError::Database(_) | StorageError::Io(_) => {
                tracing::error!(error = %err, "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn storage_errors_map_to_statuses() {
        let cases = [
            (StorageError::RecordNotFound("x".into()), StatusCode::NOT_FOUND),
            (StorageError::DuplicateContent("x".into()), StatusCode::CONFLICT),
            (
                StorageError::ChunkMissing {
                    identifier: "x".into(),
                    chunk_number: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                StorageError::IntegrityMismatch {
                    expected: "a".into(),
                    actual: "b".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (StorageError::InvalidIdentifier("..".into()), StatusCode::BAD_REQUEST),
            (
                StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn chunk_missing_message_names_the_chunk() {
        let err = AppError::from(StorageError::ChunkMissing {
            identifier: "abc".into(),
            chunk_number: 3,
        });
        assert_eq!(err.message, "chunk 3 of upload `abc` is missing");
    }
}
