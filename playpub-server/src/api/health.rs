//! Health Check API Handlers
//!
//! Liveness endpoints for monitoring.

use axum::{Json, http::StatusCode, response::IntoResponse};
use playpub_core::dto::build::MessageResponse;

/// GET /
/// Service banner
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Play Store Publisher API".to_string(),
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
