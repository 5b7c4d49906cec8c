mod orchestrator;
mod store;

pub use orchestrator::{CancelOutcome, Orchestrator, PollResponse, SubmitResponse};
pub use store::{InMemoryJobStore, JobStore, StoreError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::model::{ExtractionRequest, RecipeDraft};

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Success,
    Failure,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change applied atomically by a [`JobStore`]
#[derive(Debug, Clone)]
pub enum JobChange {
    /// PENDING -> RUNNING, first attempt
    Start,
    /// RUNNING -> RUNNING, one more attempt
    Retry,
    /// RUNNING -> SUCCESS
    Succeed(RecipeDraft),
    /// PENDING|RUNNING -> FAILURE
    Fail(String),
}

impl JobChange {
    pub fn target(&self) -> JobState {
        match self {
            JobChange::Start | JobChange::Retry => JobState::Running,
            JobChange::Succeed(_) => JobState::Success,
            JobChange::Fail(_) => JobState::Failure,
        }
    }

    /// Whether this change may be applied to a job in `from`
    pub fn allowed_from(&self, from: JobState) -> bool {
        matches!(
            (from, self),
            (JobState::Pending, JobChange::Start)
                | (JobState::Pending, JobChange::Fail(_))
                | (JobState::Running, JobChange::Retry)
                | (JobState::Running, JobChange::Succeed(_))
                | (JobState::Running, JobChange::Fail(_))
        )
    }
}

/// One URL-to-recipe extraction tracked through its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub request: ExtractionRequest,
    pub state: JobState,
    pub attempt_count: u32,
    pub result: Option<RecipeDraft>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(request: ExtractionRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request,
            state: JobState::Pending,
            attempt_count: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a change that has already been checked with `allowed_from`
    pub(crate) fn apply(&mut self, change: JobChange) {
        self.state = change.target();
        match change {
            JobChange::Start | JobChange::Retry => self.attempt_count += 1,
            JobChange::Succeed(draft) => self.result = Some(draft),
            JobChange::Fail(error) => self.error = Some(error),
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(ExtractionRequest::new("https://example.com"));
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempt_count, 0);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_transitions_are_one_directional() {
        let all = [
            JobState::Pending,
            JobState::Running,
            JobState::Success,
            JobState::Failure,
        ];
        let changes = [
            JobChange::Start,
            JobChange::Retry,
            JobChange::Succeed(RecipeDraft::default()),
            JobChange::Fail("x".into()),
        ];

        for state in all {
            for change in &changes {
                if state.is_terminal() {
                    assert!(!change.allowed_from(state), "{:?} from {}", change, state);
                }
                if change.allowed_from(state) {
                    assert_ne!(change.target(), JobState::Pending);
                }
            }
        }

        assert!(!JobChange::Succeed(RecipeDraft::default()).allowed_from(JobState::Pending));
        assert!(!JobChange::Start.allowed_from(JobState::Running));
    }

    #[test]
    fn test_apply_counts_attempts() {
        let mut job = Job::new(ExtractionRequest::new("https://example.com"));
        job.apply(JobChange::Start);
        job.apply(JobChange::Retry);
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.attempt_count, 2);

        job.apply(JobChange::Fail("Unsupported content: no media".into()));
        assert_eq!(job.state, JobState::Failure);
        assert_eq!(job.error.as_deref(), Some("Unsupported content: no media"));
    }

    #[test]
    fn test_state_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&JobState::Running).unwrap(), "\"RUNNING\"");
    }
}
