//! Build executor
//!
//! Drives one build from `PENDING` to a terminal state. The executor is the
//! only writer of a running build apart from cancellation and the sweeper,
//! both of which can only fail it; every write goes through
//! [`JobStore::apply`], so a build stopped from outside is noticed at the
//! next checkpoint.

use std::sync::Arc;
use std::time::Duration;

use playpub_core::domain::build::{Transition, TransitionError};
use playpub_core::domain::config::BuildConfig;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::repository::{JobStore, StoreError};
use crate::storage::BuildInputs;
use crate::worker::packager::{PackageRequest, Packager};
use crate::worker::stages::{START_MESSAGE, STAGES, SUCCESS_MESSAGE};

/// A stored build whose inputs are on disk, ready to run
#[derive(Debug, Clone)]
pub struct PreparedBuild {
    pub id: Uuid,
    /// Unredacted configuration, handed to the packager only
    pub config: BuildConfig,
    pub inputs: BuildInputs,
}

#[derive(Clone)]
pub struct BuildExecutor {
    store: Arc<dyn JobStore>,
    packager: Arc<dyn Packager>,
    stage_delay: Duration,
    semaphore: Arc<Semaphore>,
}

impl BuildExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        packager: Arc<dyn Packager>,
        stage_delay: Duration,
        max_concurrent_builds: usize,
    ) -> Self {
        Self {
            store,
            packager,
            stage_delay,
            semaphore: Arc::new(Semaphore::new(max_concurrent_builds)),
        }
    }

    /// Spawns a task running the build once a concurrency slot is free
    ///
    /// Until then the build stays `PENDING`.
    pub fn spawn(&self, build: PreparedBuild) -> JoinHandle<()> {
        let executor = self.clone();

        tokio::spawn(async move {
            let _permit = match Arc::clone(&executor.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Executor shut down before build {} could start", build.id);
                    return;
                }
            };

            executor.run(build).await;
            // Permit is released when dropped
        })
    }

    /// Runs a build to completion on the current task
    pub async fn run(&self, build: PreparedBuild) {
        let id = build.id;

        if !self.advance(id, Transition::Start).await {
            return;
        }
        info!("Build {} started", id);

        let config_line = match serde_json::to_string(&build.config.redacted()) {
            Ok(json) => format!("Configuration: {}", json),
            Err(_) => format!("Configuration: {}", build.config.label()),
        };
        for message in [START_MESSAGE.to_string(), config_line] {
            if !self.advance(id, Transition::Log { message }).await {
                return;
            }
        }

        for stage in STAGES {
            let transition = Transition::Stage {
                message: stage.message.to_string(),
                progress: stage.progress,
            };
            if !self.advance(id, transition).await {
                return;
            }
            debug!("Build {} reached stage {} ({}%)", id, stage.name, stage.progress);

            if !self.stage_delay.is_zero() {
                tokio::time::sleep(self.stage_delay).await;
            }
        }

        if !self.is_active(id).await {
            return;
        }

        let request = PackageRequest {
            build_id: id,
            config: build.config,
            inputs: build.inputs,
        };

        match self.packager.package(&request).await {
            Ok(output) => {
                for message in output.log {
                    if !self.advance(id, Transition::Log { message }).await {
                        return;
                    }
                }

                let transition = Transition::Complete {
                    output_ref: output.artifact.display().to_string(),
                    message: SUCCESS_MESSAGE.to_string(),
                };
                if self.advance(id, transition).await {
                    info!("Build {} completed", id);
                }
            }
            Err(e) => {
                warn!("Build {} failed: {}", id, e);
                self.advance(id, Transition::Fail { error: e.to_string() })
                    .await;
            }
        }
    }

    /// Applies a transition; returns false once the build must not continue
    async fn advance(&self, id: Uuid, transition: Transition) -> bool {
        match self.store.apply(id, transition).await {
            Ok(_) => true,
            Err(StoreError::NotFound(_)) => {
                info!("Build {} was deleted, stopping", id);
                false
            }
            Err(StoreError::Transition(TransitionError::Terminal { status, .. })) => {
                info!("Build {} is already {}, stopping", id, status);
                false
            }
            Err(e) => {
                error!("Failed to update build {}: {}", id, e);

                // Leave a terminal record behind rather than a dangling build.
                let fail = Transition::Fail {
                    error: format!("internal error: {}", e),
                };
                if let Err(e) = self.store.apply(id, fail).await {
                    error!("Failed to mark build {} as failed: {}", id, e);
                }
                false
            }
        }
    }

    async fn is_active(&self, id: Uuid) -> bool {
        match self.store.get(id).await {
            Ok(Some(job)) => !job.is_terminal(),
            Ok(None) => false,
            Err(e) => {
                error!("Failed to read build {}: {}", id, e);
                false
            }
        }
    }
}
