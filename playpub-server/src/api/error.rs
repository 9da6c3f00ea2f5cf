//! API Error Handling
//!
//! Unified error type and conversion for API responses. Every non-2xx
//! response carries `{ "detail": ... }`.

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use playpub_core::domain::config::ValidationError;
use playpub_core::dto::build::ErrorResponse;

use crate::service::BuildError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.message().to_string())
    }
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        let detail = err.to_string();
        match err {
            BuildError::Validation(err) => err.into(),
            BuildError::NotFound(_) | BuildError::ArtifactMissing(_) => ApiError::NotFound(detail),
            BuildError::NotCompleted { .. } => ApiError::BadRequest(detail),
            BuildError::Store(_) | BuildError::Upload(_) => ApiError::InternalError(detail),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
