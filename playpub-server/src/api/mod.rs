//! API Module
//!
//! HTTP API layer for the build server.
//! Each submodule handles endpoints for a specific domain.

pub mod build;
pub mod error;
pub mod health;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::BuildService;

/// Create the main API router with all endpoints
pub fn create_router(service: Arc<BuildService>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Banner and health check
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        // Build endpoints
        .route("/api/generate-aab", post(build::generate_aab))
        .route("/api/builds", get(build::list_builds))
        .route(
            "/api/build/{id}",
            get(build::get_build).delete(build::delete_build),
        )
        .route("/api/build/{id}/cancel", post(build::cancel_build))
        .route("/api/build/{id}/artifact", get(build::download_artifact))
        // Add state and middleware
        .with_state(service)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
