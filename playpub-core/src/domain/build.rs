//! Build job domain types
//!
//! A build job is created `PENDING`, moved to `PROCESSING` by its worker and
//! ends `COMPLETED` or `FAILED`. Every mutation goes through
//! [`BuildJob::apply`], which refuses anything that would break the job's
//! invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::config::BuildConfig;
use crate::domain::log::LogEntry;

/// Progress value reserved for completed builds
pub const PROGRESS_COMPLETE: u8 = 100;

/// Build job record
///
/// Structure shared between the server (stores and mutates) and the client
/// (reads snapshots).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub id: Uuid,
    pub status: BuildStatus,
    pub progress: u8,
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    pub config: BuildConfig,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Build execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BuildStatus {
    /// Completed and failed builds never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Completed | BuildStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Pending => "PENDING",
            BuildStatus::Processing => "PROCESSING",
            BuildStatus::Completed => "COMPLETED",
            BuildStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BuildStatus::Pending),
            "PROCESSING" => Ok(BuildStatus::Processing),
            "COMPLETED" => Ok(BuildStatus::Completed),
            "FAILED" => Ok(BuildStatus::Failed),
            other => Err(format!("unknown build status: {}", other)),
        }
    }
}

/// A single mutation of a build job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `PENDING` to `PROCESSING`
    Start,
    /// Stage checkpoint: log line plus progress jump
    Stage { message: String, progress: u8 },
    /// Plain log line
    Log { message: String },
    /// `PROCESSING` to `COMPLETED`
    Complete { output_ref: String, message: String },
    /// Any non-terminal state to `FAILED`
    Fail { error: String },
}

/// A transition that would break a job invariant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("build {id} is already {status}")]
    Terminal { id: Uuid, status: BuildStatus },

    #[error("build {id} cannot {action} while {status}")]
    InvalidState {
        id: Uuid,
        status: BuildStatus,
        action: &'static str,
    },

    #[error("build {id} progress cannot move from {current} back to {requested}")]
    ProgressRegression { id: Uuid, current: u8, requested: u8 },

    #[error("stage progress must stay below 100, got {0}")]
    ProgressOutOfRange(u8),
}

impl BuildJob {
    /// Creates a freshly submitted job
    pub fn new(id: Uuid, config: BuildConfig, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: BuildStatus::Pending,
            progress: 0,
            logs: Vec::new(),
            error: None,
            output_ref: None,
            config,
            start_time: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a transition, leaving the job untouched when it is rejected
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Terminal {
                id: self.id,
                status: self.status,
            });
        }

        match transition {
            Transition::Start => {
                self.require(BuildStatus::Pending, "start")?;
                self.status = BuildStatus::Processing;
                self.started_at = Some(now);
            }
            Transition::Stage { message, progress } => {
                self.require(BuildStatus::Processing, "advance")?;
                if progress >= PROGRESS_COMPLETE {
                    return Err(TransitionError::ProgressOutOfRange(progress));
                }
                if progress < self.progress {
                    return Err(TransitionError::ProgressRegression {
                        id: self.id,
                        current: self.progress,
                        requested: progress,
                    });
                }
                self.progress = progress;
                self.logs.push(LogEntry::new(message, now));
            }
            Transition::Log { message } => {
                self.logs.push(LogEntry::new(message, now));
            }
            Transition::Complete {
                output_ref,
                message,
            } => {
                self.require(BuildStatus::Processing, "complete")?;
                self.progress = PROGRESS_COMPLETE;
                self.logs.push(LogEntry::new(message, now));
                self.output_ref = Some(output_ref);
                self.status = BuildStatus::Completed;
                self.finished_at = Some(now);
            }
            Transition::Fail { error } => {
                self.logs.push(LogEntry::new(format!("Error: {}", error), now));
                self.error = Some(error);
                self.status = BuildStatus::Failed;
                self.finished_at = Some(now);
            }
        }

        debug_assert!(self.is_consistent());
        Ok(())
    }

    /// Checks the cross-field invariants of a snapshot
    pub fn is_consistent(&self) -> bool {
        let completed = self.status == BuildStatus::Completed;
        let failed = self.status == BuildStatus::Failed;

        completed == (self.progress == PROGRESS_COMPLETE)
            && completed == self.output_ref.is_some()
            && failed == self.error.is_some()
            && self.progress <= PROGRESS_COMPLETE
    }

    fn require(&self, expected: BuildStatus, action: &'static str) -> Result<(), TransitionError> {
        if self.status != expected {
            return Err(TransitionError::InvalidState {
                id: self.id,
                status: self.status,
                action,
            });
        }
        Ok(())
    }
}
