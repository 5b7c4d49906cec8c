use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{Job, JobChange, JobId, JobState};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    /// Compare-and-set lost: the job is no longer in the expected state
    #[error("job {id} is {actual}, expected {expected}")]
    Conflict {
        id: JobId,
        expected: JobState,
        actual: JobState,
    },

    #[error("cannot move job from {from} to {to}")]
    IllegalTransition { from: JobState, to: JobState },

    #[error("job store unavailable: {0}")]
    Backend(String),
}

/// Durable record store for jobs.
///
/// `transition` must be atomic: the change is applied only if the job is
/// currently in `expected`, otherwise `StoreError::Conflict` is returned and
/// nothing is written.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: Job) -> Result<(), StoreError>;

    async fn transition(
        &self,
        id: JobId,
        expected: JobState,
        change: JobChange,
    ) -> Result<Job, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;
}

/// Process-local store, the default when no external store is injected
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Backend(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn transition(
        &self,
        id: JobId,
        expected: JobState,
        change: JobChange,
    ) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.state != expected {
            return Err(StoreError::Conflict {
                id,
                expected,
                actual: job.state,
            });
        }
        if !change.allowed_from(job.state) {
            return Err(StoreError::IllegalTransition {
                from: job.state,
                to: change.target(),
            });
        }

        job.apply(change);
        Ok(job.clone())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }
}
