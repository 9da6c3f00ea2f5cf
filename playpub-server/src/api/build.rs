//! Build API Handlers
//!
//! HTTP endpoints for submitting and managing AAB builds.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use playpub_core::domain::build::BuildJob;
use playpub_core::domain::config::BuildConfig;
use playpub_core::dto::build::{BuildList, MessageResponse, SubmitBuildResponse};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::{BuildError, BuildService};
use crate::storage::InputArtifact;

/// Multipart part holding the build configuration as JSON text
pub const CONFIG_FIELD: &str = "config";

// =============================================================================
// Build Lifecycle Endpoints
// =============================================================================

/// POST /api/generate-aab
/// Accept a build configuration with its input files and start the build
pub async fn generate_aab(
    State(service): State<Arc<BuildService>>,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmitBuildResponse>> {
    let mut config: Option<BuildConfig> = None;
    let mut inputs = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == CONFIG_FIELD {
            if config.is_some() {
                return Err(ApiError::BadRequest(format!(
                    "{} was sent more than once",
                    CONFIG_FIELD
                )));
            }
            let text = field.text().await?;
            config = Some(BuildConfig::from_json(&text)?);
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await?;
        inputs.push(InputArtifact::new(name, file_name, data.to_vec()));
    }

    let config =
        config.ok_or_else(|| ApiError::BadRequest(format!("{} is required", CONFIG_FIELD)))?;

    tracing::info!(
        "Build requested for {} with {} input(s)",
        config.label(),
        inputs.len()
    );

    let job = service.submit(config, inputs).await?;

    Ok(Json(SubmitBuildResponse {
        build_id: job.id,
        status: job.status,
    }))
}

/// GET /api/build/{id}
/// Get the current snapshot of a build
pub async fn get_build(
    State(service): State<Arc<BuildService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<BuildJob>> {
    let id = parse_build_id(&id)?;
    tracing::debug!("Getting build: {}", id);

    Ok(Json(service.get_status(id).await?))
}

/// GET /api/builds
/// List all builds, most recent first
pub async fn list_builds(State(service): State<Arc<BuildService>>) -> ApiResult<Json<BuildList>> {
    tracing::debug!("Listing builds");

    let builds = service.list().await?;
    Ok(Json(BuildList { builds }))
}

/// POST /api/build/{id}/cancel
/// Cancel a build that has not finished yet
pub async fn cancel_build(
    State(service): State<Arc<BuildService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<BuildJob>> {
    let id = parse_build_id(&id)?;
    tracing::info!("Cancelling build: {}", id);

    Ok(Json(service.cancel(id).await?))
}

/// DELETE /api/build/{id}
/// Delete a build and its files
pub async fn delete_build(
    State(service): State<Arc<BuildService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_build_id(&id)?;
    tracing::info!("Deleting build: {}", id);

    service.delete(id).await?;

    Ok(Json(MessageResponse {
        message: format!("Build {} deleted", id),
    }))
}

/// GET /api/build/{id}/artifact
/// Download the bundle of a completed build
pub async fn download_artifact(
    State(service): State<Arc<BuildService>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_build_id(&id)?;
    let (job, path) = service.artifact(id).await?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BuildError::ArtifactMissing(id),
        _ => BuildError::Upload(e),
    })?;
    let len = file.metadata().await.map_err(BuildError::Upload)?.len();

    tracing::info!("Serving artifact for build {} ({} bytes)", id, len);

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                artifact_file_name(&job.config.app_name)
            ),
        ),
        (header::CONTENT_LENGTH, len.to_string()),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_build_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid build id: {}", raw)))
}

/// `<appName>.aab`, reduced to characters safe inside a quoted header value
fn artifact_file_name(app_name: &str) -> String {
    let stem: String = app_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() {
        "app.aab".to_string()
    } else {
        format!("{}.aab", stem)
    }
}
