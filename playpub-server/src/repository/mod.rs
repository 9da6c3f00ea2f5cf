//! Repository Module
//!
//! Data access layer for the build server. The [`JobStore`] trait is the
//! only shared mutable state in the process; it is injected into the
//! service and the worker rather than living in module-level state.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryJobStore;
pub use postgres::PgJobStore;

use async_trait::async_trait;
use playpub_core::domain::build::{BuildJob, Transition, TransitionError};
use playpub_core::dto::build::BuildSummary;
use thiserror::Error;
use uuid::Uuid;

/// Repository error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("build {0} not found")]
    NotFound(Uuid),

    #[error("build {0} already exists")]
    AlreadyExists(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored build {id} is unreadable: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for build jobs
///
/// `apply` is the single mutation path after insertion. Implementations
/// serialize it per build so that logs stay append-only and progress stays
/// monotonic, and return the snapshot produced by the transition.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a freshly created build
    async fn insert(&self, job: BuildJob) -> StoreResult<()>;

    /// Full snapshot of a build
    async fn get(&self, id: Uuid) -> StoreResult<Option<BuildJob>>;

    /// Summaries of every build, most recent first
    async fn list(&self) -> StoreResult<Vec<BuildSummary>>;

    /// Removes a build; returns whether it existed
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Applies a lifecycle transition to a build
    async fn apply(&self, id: Uuid, transition: Transition) -> StoreResult<BuildJob>;
}
