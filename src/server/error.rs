//! HTTP error responses.
//!
//! Fatal pipeline errors are logged in full and reach the client only as a
//! generic 500. Client mistakes and rejections carry their message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::AppError;

/// Everything a handler can answer with besides success.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with the message.
    BadRequest(String),
    /// 415 for non-audio uploads.
    UnsupportedMediaType(String),
    /// 400 carrying the model's reason.
    Rejected { reason: String },
    /// 500; the detail stays in the server log.
    Internal(AppError),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidInput(message) => Self::BadRequest(message),
            other => Self::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            Self::UnsupportedMediaType(message) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                json!({ "error": message }),
            ),
            Self::Rejected { reason } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Query not generated", "reason": reason }),
            ),
            Self::Internal(err) => {
                error!(category = err.category(), error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
