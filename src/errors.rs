use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The path does not lead to a `file` field.
    #[error("field `{0}` not found")]
    FieldNotFound(String),
    #[error("{kind} `{identifier}` not found")]
    SchemaNotFound { kind: String, identifier: String },
    #[error("{0}")]
    InvalidArgument(String),
    #[error("invalid checksum for field `{field}`")]
    IntegrityViolation { field: String },
    #[error("object store request against `{bucket}` failed: {message}")]
    RemoteStore { bucket: String, message: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn remote(bucket: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::RemoteStore {
            bucket: bucket.into(),
            message: err.to_string(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

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

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

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
        match err {
            StorageError::FieldNotFound(_) | StorageError::SchemaNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            StorageError::InvalidArgument(_) | StorageError::IntegrityViolation { .. } => {
                AppError::bad_request(err.to_string())
            }
            StorageError::RemoteStore { .. } => {
                tracing::warn!(error = %err, "object store failure");
                AppError::new(StatusCode::BAD_GATEWAY, "object store unavailable")
            }
            other => {
                tracing::error!(error = %other, "internal storage error");
                AppError::internal("internal error")
            }
        }
    }
}
