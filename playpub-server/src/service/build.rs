//! Build Service
//!
//! Business logic for the build lifecycle: submission, status reads,
//! listing, cancellation, deletion and the supervisory sweep.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use playpub_core::domain::build::{BuildJob, BuildStatus, Transition, TransitionError};
use playpub_core::domain::config::{BuildConfig, ValidationError};
use playpub_core::dto::build::BuildSummary;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::repository::{JobStore, StoreError};
use crate::storage::{APK_FIELD, InputArtifact, KEYSTORE_FIELD, UploadStore};
use crate::worker::{BuildExecutor, CommandPackager, Packager, PreparedBuild, SimulatedPackager};

/// Error recorded when a build is cancelled
pub const CANCELLED: &str = "cancelled";

/// Service error type
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Build {0} not found")]
    NotFound(Uuid),

    #[error("Build {id} is not completed (status: {status})")]
    NotCompleted { id: Uuid, status: BuildStatus },

    #[error("Artifact for build {0} not found")]
    ArtifactMissing(Uuid),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("failed to store uploaded files: {0}")]
    Upload(#[from] std::io::Error),
}

impl From<StoreError> for BuildError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BuildError::NotFound(id),
            other => BuildError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Timeout and retention policy applied by the sweeper
#[derive(Debug, Clone, Copy)]
pub struct SweepPolicy {
    pub job_timeout: Duration,
    pub retention: Option<Duration>,
}

impl SweepPolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            job_timeout: config.job_timeout,
            retention: config.retention,
        }
    }
}

/// Builds affected by one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: Vec<Uuid>,
    pub purged: Vec<Uuid>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.purged.is_empty()
    }
}

pub struct BuildService {
    store: Arc<dyn JobStore>,
    uploads: UploadStore,
    executor: BuildExecutor,
}

impl BuildService {
    pub fn new(store: Arc<dyn JobStore>, uploads: UploadStore, executor: BuildExecutor) -> Self {
        Self {
            store,
            uploads,
            executor,
        }
    }

    /// Wires the service from server configuration
    pub fn from_config(config: &ServerConfig, store: Arc<dyn JobStore>) -> Self {
        let packager: Arc<dyn Packager> = match &config.packager_command {
            Some(program) => {
                info!("Using external packager: {}", program);
                Arc::new(CommandPackager::new(program.clone(), config.packager_args.clone()))
            }
            None => {
                info!("No packager command configured, using simulated packager");
                Arc::new(SimulatedPackager)
            }
        };

        let executor = BuildExecutor::new(
            Arc::clone(&store),
            packager,
            config.stage_delay,
            config.max_concurrent_builds,
        );

        Self::new(store, UploadStore::new(config.upload_dir.clone()), executor)
    }

    /// Accepts a build and starts it in the background
    ///
    /// Returns the `PENDING` snapshot that was stored. Nothing is stored when
    /// validation fails.
    pub async fn submit(&self, config: BuildConfig, inputs: Vec<InputArtifact>) -> Result<BuildJob> {
        config.validate()?;
        validate_inputs(&inputs)?;

        let id = Uuid::new_v4();
        let saved = self.uploads.save_inputs(id, &inputs).await?;

        let job = BuildJob::new(id, config.redacted(), Utc::now());
        if let Err(e) = self.store.insert(job.clone()).await {
            let _ = self.uploads.remove(id).await;
            return Err(e.into());
        }

        info!(
            "Build {} submitted: {} (versionCode {}), {} input(s)",
            id,
            config.label(),
            config.version_code,
            inputs.len()
        );

        self.executor.spawn(PreparedBuild {
            id,
            config,
            inputs: saved,
        });

        Ok(job)
    }

    /// Current snapshot of a build
    pub async fn get_status(&self, id: Uuid) -> Result<BuildJob> {
        self.store.get(id).await?.ok_or(BuildError::NotFound(id))
    }

    /// Location of a completed build's bundle
    ///
    /// Fails with `NotCompleted` for builds in any other state and with
    /// `ArtifactMissing` when the file is gone from disk.
    pub async fn artifact(&self, id: Uuid) -> Result<(BuildJob, PathBuf)> {
        let job = self.get_status(id).await?;
        if job.status != BuildStatus::Completed {
            return Err(BuildError::NotCompleted {
                id,
                status: job.status,
            });
        }

        let path = job
            .output_ref
            .as_deref()
            .map(PathBuf::from)
            .ok_or(BuildError::ArtifactMissing(id))?;

        if !tokio::fs::try_exists(&path).await? {
            warn!("Build {} is completed but {} is missing", id, path.display());
            return Err(BuildError::ArtifactMissing(id));
        }

        Ok((job, path))
    }

    /// Summaries of all builds, most recent first
    pub async fn list(&self) -> Result<Vec<BuildSummary>> {
        Ok(self.store.list().await?)
    }

    /// Fails a build that has not finished yet
    ///
    /// Cancelling a finished build changes nothing and is not an error.
    pub async fn cancel(&self, id: Uuid) -> Result<BuildJob> {
        let job = self.get_status(id).await?;
        if job.is_terminal() {
            debug!("Build {} is already {}, nothing to cancel", id, job.status);
            return Ok(job);
        }

        let transition = Transition::Fail {
            error: CANCELLED.to_string(),
        };

        match self.store.apply(id, transition).await {
            Ok(job) => {
                info!("Build {} cancelled", id);
                Ok(job)
            }
            // Finished between the read and the write.
            Err(StoreError::Transition(TransitionError::Terminal { .. })) => self.get_status(id).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a build and its files
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(BuildError::NotFound(id));
        }

        if let Err(e) = self.uploads.remove(id).await {
            warn!("Build {} deleted but its files remain: {}", id, e);
        }

        info!("Build {} deleted", id);
        Ok(())
    }

    /// Fails builds stuck past the timeout and purges expired finished builds
    pub async fn sweep(&self, policy: &SweepPolicy, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for summary in self.store.list().await? {
            let Some(job) = self.store.get(summary.id).await? else {
                continue;
            };

            if !job.is_terminal() {
                let since = job.started_at.unwrap_or(job.start_time);
                if elapsed(since, now) > policy.job_timeout {
                    let transition = Transition::Fail {
                        error: format!("timed out after {}s", policy.job_timeout.as_secs()),
                    };
                    match self.store.apply(job.id, transition).await {
                        Ok(_) => {
                            warn!("Build {} timed out while {}", job.id, job.status);
                            report.timed_out.push(job.id);
                        }
                        Err(StoreError::NotFound(_))
                        | Err(StoreError::Transition(TransitionError::Terminal { .. })) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            } else if let (Some(retention), Some(finished_at)) = (policy.retention, job.finished_at) {
                if elapsed(finished_at, now) > retention && self.store.delete(job.id).await? {
                    let _ = self.uploads.remove(job.id).await;
                    info!("Build {} purged after retention period", job.id);
                    report.purged.push(job.id);
                }
            }
        }

        Ok(report)
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

// =============================================================================
// Validation
// =============================================================================

fn validate_inputs(inputs: &[InputArtifact]) -> std::result::Result<(), ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::new("At least one input file is required"));
    }

    for input in inputs {
        if input.data.is_empty() {
            return Err(ValidationError::new(format!(
                "Input '{}' is empty",
                input.field
            )));
        }
    }

    for field in [APK_FIELD, KEYSTORE_FIELD] {
        if inputs.iter().filter(|i| i.field == field).count() > 1 {
            return Err(ValidationError::new(format!(
                "{} was sent more than once",
                field
            )));
        }
    }

    if !inputs.iter().any(|i| i.field == APK_FIELD) {
        return Err(ValidationError::new(format!("{} is required", APK_FIELD)));
    }

    Ok(())
}
