use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use batchconv::{JobError, LegacyError};

/// Application-level error type for HTTP handlers.
///
/// Every variant renders as `{"error": message}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// A conversion failure whose message is safe to show the client.
    #[error("{0}")]
    Conversion(String),

    /// Anything else; logged and reported generically.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound => AppError::NotFound(err.to_string()),
            JobError::NoFiles | JobError::NotReady => AppError::BadRequest(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<LegacyError> for AppError {
    fn from(err: LegacyError) -> Self {
        match err {
            LegacyError::NoFiles => AppError::BadRequest(err.to_string()),
            LegacyError::AllFailed => AppError::Conversion(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conversion(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}
