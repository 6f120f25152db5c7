pub mod live;
pub mod packets;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::error::AppError;

/// Helper to create consistent JSON error responses
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "errors": message
        })),
    )
        .into_response()
}

/// Maps the application error kinds onto HTTP responses. Validation
/// failures carry the violated field name and reason.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        ApiError(error)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError(AppError::Internal(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            AppError::Validation { field, reason } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "errors": { field: reason } })),
            )
                .into_response(),
            AppError::Format(message) => json_error(StatusCode::BAD_REQUEST, &message),
            AppError::NotFound => json_error(StatusCode::NOT_FOUND, "not found"),
            AppError::Conflict(message) => json_error(StatusCode::CONFLICT, &message),
            AppError::InvalidState(message) => json_error(StatusCode::CONFLICT, message),
            AppError::Cancelled => {
                json_error(StatusCode::SERVICE_UNAVAILABLE, "shutting down")
            }
            AppError::Internal(e) => {
                error!("Internal error handling request: {e:#}");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
