use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::request::RideRequest;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Lost race or illegal transition; carries the record as it stands.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        current: Box<RideRequest>,
    },

    /// A backing store could not be reached or read.
    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn conflict(message: impl Into<String>, current: RideRequest) -> Self {
        AppError::Conflict {
            message: message.into(),
            current: Box::new(current),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict { message, current } => (
                StatusCode::CONFLICT,
                json!({ "error": message, "request": current }),
            ),
            AppError::Storage(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}
