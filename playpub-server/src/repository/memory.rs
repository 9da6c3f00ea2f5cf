//! In-memory job store
//!
//! Builds live in a map guarded by a `RwLock`; each build sits behind its own
//! `RwLock` so that writers for one build never block readers of another.
//! Contents are lost on restart.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use playpub_core::domain::build::{BuildJob, Transition};
use playpub_core::dto::build::BuildSummary;
use uuid::Uuid;

use super::{JobStore, StoreError, StoreResult};

type Slot = Arc<RwLock<BuildJob>>;

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Slot>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: Uuid) -> Option<Slot> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&id).cloned()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: BuildJob) -> StoreResult<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }

        jobs.insert(job.id, Arc::new(RwLock::new(job)));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<BuildJob>> {
        Ok(self.slot(id).map(|slot| {
            let job = slot.read().unwrap_or_else(PoisonError::into_inner);
            job.clone()
        }))
    }

    async fn list(&self) -> StoreResult<Vec<BuildSummary>> {
        let slots: Vec<Slot> = {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            jobs.values().cloned().collect()
        };

        let mut summaries: Vec<BuildSummary> = slots
            .iter()
            .map(|slot| {
                let job = slot.read().unwrap_or_else(PoisonError::into_inner);
                BuildSummary::from(&*job)
            })
            .collect();

        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.remove(&id).is_some())
    }

    async fn apply(&self, id: Uuid, transition: Transition) -> StoreResult<BuildJob> {
        let slot = self.slot(id).ok_or(StoreError::NotFound(id))?;
        let mut job = slot.write().unwrap_or_else(PoisonError::into_inner);

        // Work on a copy so a rejected transition leaves the stored job intact.
        let mut next = job.clone();
        next.apply(transition, Utc::now())?;
        *job = next;

        Ok(job.clone())
    }
}
