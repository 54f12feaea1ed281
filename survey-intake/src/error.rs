//! Error types for survey-intake
//!
//! Every failure a request can hit maps to one JSON body of the form
//! `{"error": <code>, "detail": <string or field list>}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::storage::StorageError;
use crate::submission::FieldError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Body is not JSON, not an object, or not declared as JSON (400)
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Body parsed but failed schema validation (422)
    #[error("Validation failed with {} field error(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// Record could not be persisted (500, or 503 on timeout)
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(StorageError::Timeout(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::InvalidJson(detail) => json!({
                "error": "invalid_json",
                "detail": detail,
            }),
            ApiError::Validation(errors) => json!({
                "error": "validation_error",
                "detail": errors,
            }),
            ApiError::Storage(err) => {
                // Full error (with store path) stays in the log
                error!(error = %err, "Failed to persist survey submission");
                let detail = match err {
                    StorageError::Timeout(limit) => {
                        format!("storage did not respond within {} ms", limit.as_millis())
                    }
                    _ => "failed to persist submission".to_string(),
                };
                json!({
                    "error": "storage_error",
                    "detail": detail,
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
