//! Build DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::build::{BuildJob, BuildStatus};

/// Response to a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBuildResponse {
    pub build_id: Uuid,
    pub status: BuildStatus,
}

/// Reduced projection of a job used in listings (never carries logs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub id: Uuid,
    pub status: BuildStatus,
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    pub app_name: String,
}

impl From<&BuildJob> for BuildSummary {
    fn from(job: &BuildJob) -> Self {
        BuildSummary {
            id: job.id,
            status: job.status,
            progress: job.progress,
            start_time: job.start_time,
            app_name: job.config.label().to_string(),
        }
    }
}

/// Body of `GET /api/builds`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildList {
    pub builds: Vec<BuildSummary>,
}

/// Body of informational responses such as a successful delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
