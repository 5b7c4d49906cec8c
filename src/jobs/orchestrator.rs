use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Job, JobChange, JobId, JobState, JobStore, StoreError};
use crate::config::JobsConfig;
use crate::error::HarvestError;
use crate::model::{ExtractionRequest, RecipeDraft};
use crate::pipeline::Pipeline;
use crate::retry::RetryPolicy;

const WAIT_INTERVAL: Duration = Duration::from_millis(50);

/// Reply to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// What a caller sees when polling a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollResponse {
    Pending,
    Running,
    Success { result: RecipeDraft },
    Failure { error: String },
    NotFound,
}

impl PollResponse {
    fn from_job(job: Job) -> Self {
        match job.state {
            JobState::Pending => PollResponse::Pending,
            JobState::Running => PollResponse::Running,
            JobState::Success => match job.result {
                Some(result) => PollResponse::Success { result },
                None => PollResponse::Failure {
                    error: HarvestError::Internal("success without result".into()).to_string(),
                },
            },
            JobState::Failure => PollResponse::Failure {
                error: job.error.unwrap_or_else(|| "Unknown error".to_string()),
            },
        }
    }

    /// HTTP status a web layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            PollResponse::Pending | PollResponse::Running => 202,
            PollResponse::Success { .. } => 200,
            PollResponse::Failure { .. } => 500,
            PollResponse::NotFound => 404,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollResponse::Success { .. } | PollResponse::Failure { .. })
    }
}

/// Result of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and is now FAILURE
    Cancelled,
    /// The job is running; its worker will stop at the next stage boundary
    Requested,
    /// Nothing to do, the job already ended
    AlreadyFinished(JobState),
    NotFound,
}

/// Owns the job lifecycle: submission, worker dispatch, retries and cancellation
pub struct Orchestrator {
    inner: Arc<Inner>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
    max_retries: u32,
    backoff: RetryPolicy,
    commit_policy: RetryPolicy,
    queue: UnboundedSender<JobId>,
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
    shutdown: CancellationToken,
}

fn parse_id(job_id: &str) -> Option<JobId> {
    Uuid::parse_str(job_id.trim()).ok()
}

impl Orchestrator {
    /// Spawn the worker pool. Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn JobStore>, pipeline: Pipeline, config: &JobsConfig) -> Self {
        let (queue, receiver) = unbounded_channel();
        let inner = Arc::new(Inner {
            store,
            pipeline: Arc::new(pipeline),
            max_retries: config.max_retries,
            backoff: config.retry.clone(),
            commit_policy: config.retry.with_max_attempts(config.commit_attempts),
            queue,
            tokens: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..config.workers.max(1))
            .map(|n| tokio::spawn(worker(Arc::clone(&inner), Arc::clone(&receiver), n)))
            .collect();

        info!(
            "Job orchestrator started with {} workers (max retries {})",
            config.workers.max(1),
            config.max_retries
        );

        Self {
            inner,
            workers: tokio::sync::Mutex::new(workers),
        }
    }

    /// Create a PENDING job and queue it. Every call creates a new job.
    pub async fn submit(&self, request: ExtractionRequest) -> Result<JobId, HarvestError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(HarvestError::Internal("orchestrator is shut down".to_string()));
        }

        let job = Job::new(request);
        let id = job.id;
        self.inner.store.create(job).await?;
        self.inner.token(id);

        self.inner
            .queue
            .send(id)
            .map_err(|_| HarvestError::Internal("job queue closed".to_string()))?;

        info!("Job {} submitted", id);
        Ok(id)
    }

    pub async fn submit_url(&self, url: impl Into<String>) -> Result<SubmitResponse, HarvestError> {
        let job_id = self.submit(ExtractionRequest::new(url)).await?;
        Ok(SubmitResponse { job_id })
    }

    /// Read-only view of a job; malformed or unknown ids are `NotFound`
    pub async fn poll(&self, job_id: &str) -> Result<PollResponse, HarvestError> {
        let Some(id) = parse_id(job_id) else {
            return Ok(PollResponse::NotFound);
        };
        Ok(match self.inner.store.get(id).await? {
            Some(job) => PollResponse::from_job(job),
            None => PollResponse::NotFound,
        })
    }

    pub async fn job(&self, id: JobId) -> Result<Option<Job>, HarvestError> {
        Ok(self.inner.store.get(id).await?)
    }

    pub async fn cancel(&self, job_id: &str) -> Result<CancelOutcome, HarvestError> {
        let Some(id) = parse_id(job_id) else {
            return Ok(CancelOutcome::NotFound);
        };
        let Some(job) = self.inner.store.get(id).await? else {
            return Ok(CancelOutcome::NotFound);
        };

        let outcome = match job.state {
            JobState::Pending => {
                let change = JobChange::Fail(HarvestError::Cancelled.to_string());
                match self.inner.store.transition(id, JobState::Pending, change).await {
                    Ok(_) => CancelOutcome::Cancelled,
                    Err(StoreError::Conflict { actual: JobState::Running, .. }) => {
                        self.inner.signal(id);
                        CancelOutcome::Requested
                    }
                    Err(StoreError::Conflict { actual, .. }) => CancelOutcome::AlreadyFinished(actual),
                    Err(e) => return Err(e.into()),
                }
            }
            JobState::Running => {
                self.inner.signal(id);
                CancelOutcome::Requested
            }
            state => CancelOutcome::AlreadyFinished(state),
        };

        info!("Cancel for job {}: {:?}", id, outcome);
        Ok(outcome)
    }

    /// Wait until the job is terminal or `timeout` elapses, returning the latest record
    pub async fn wait_for(&self, id: JobId, timeout: Duration) -> Result<Job, HarvestError> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self
                .inner
                .store
                .get(id)
                .await?
                .ok_or(StoreError::NotFound(id))?;
            if job.state.is_terminal() || Instant::now() >= deadline {
                return Ok(job);
            }
            sleep(WAIT_INTERVAL).await;
        }
    }

    /// Stop taking jobs; workers finish the job they are on
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(e) = handle.await {
                error!("Worker ended abnormally: {}", e);
            }
        }
        info!("Job orchestrator stopped");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn worker(inner: Arc<Inner>, receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<JobId>>>, n: usize) {
    debug!("Worker {} started", n);
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                _ = inner.shutdown.cancelled() => None,
                id = receiver.recv() => id,
            }
        };
        let Some(id) = next else {
            break;
        };
        inner.execute(id).await;
    }
    debug!("Worker {} stopped", n);
}

impl Inner {
    fn tokens(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self, id: JobId) -> CancellationToken {
        self.tokens().entry(id).or_default().clone()
    }

    fn signal(&self, id: JobId) {
        if let Some(token) = self.tokens().get(&id) {
            token.cancel();
        }
    }

    fn forget(&self, id: JobId) {
        self.tokens().remove(&id);
    }

    async fn execute(&self, id: JobId) {
        match self.store.transition(id, JobState::Pending, JobChange::Start).await {
            Ok(job) => {
                let token = self.token(id);
                self.run_job(job, &token).await;
                self.forget(id);
            }
            Err(StoreError::Conflict { actual, .. }) => {
                debug!("Job {} is already {}, skipping", id, actual);
                self.forget(id);
            }
            Err(StoreError::Backend(e)) => {
                let delay = self.backoff.delay_for(1);
                warn!("Could not claim job {}: {}; requeueing in {:?}", id, e, delay);
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = queue.send(id);
                });
            }
            Err(e) => {
                error!("Could not claim job {}: {}", id, e);
                self.forget(id);
            }
        }
    }

    async fn run_job(&self, mut job: Job, token: &CancellationToken) {
        let id = job.id;
        loop {
            info!("Job {} attempt {}/{}", id, job.attempt_count, self.max_retries + 1);

            let error = match self.run_attempt(&job.request, token).await {
                Ok(draft) => {
                    info!("Job {} succeeded", id);
                    self.commit(id, JobChange::Succeed(draft)).await;
                    return;
                }
                Err(e) => e,
            };

            if error.is_transient() && job.attempt_count <= self.max_retries {
                let delay = self.backoff.delay_for(job.attempt_count);
                warn!(
                    "Job {} attempt {} failed ({}): {}; retrying in {:?}",
                    id,
                    job.attempt_count,
                    error.kind(),
                    error,
                    delay
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = token.cancelled() => {
                        self.fail(id, HarvestError::Cancelled).await;
                        return;
                    }
                }

                match self.transition(id, JobChange::Retry).await {
                    Some(updated) => job = updated,
                    None => return,
                }
                continue;
            }

            self.fail(id, error).await;
            return;
        }
    }

    /// One pipeline pass in its own task so a panic fails only this job
    async fn run_attempt(
        &self,
        request: &ExtractionRequest,
        token: &CancellationToken,
    ) -> Result<RecipeDraft, HarvestError> {
        let pipeline = Arc::clone(&self.pipeline);
        let request = request.clone();
        let token = token.clone();

        match tokio::spawn(async move { pipeline.run(&request, &token).await }).await {
            Ok(result) => result,
            Err(e) => Err(HarvestError::Internal(e.to_string())),
        }
    }

    async fn fail(&self, id: JobId, error: HarvestError) {
        match &error {
            HarvestError::Cancelled => info!("Job {} cancelled", id),
            HarvestError::Internal(details) => error!("Job {} failed: internal error: {}", id, details),
            e => error!("Job {} failed ({}): {}", id, e.kind(), e),
        }
        self.commit(id, JobChange::Fail(error.to_string())).await;
    }

    async fn commit(&self, id: JobId, change: JobChange) {
        self.transition(id, change).await;
    }

    /// RUNNING -> `change`; `None` when the job was not updated.
    ///
    /// Store outages are retried with the commit policy. If the store is still
    /// down the job stays RUNNING and the change is reattempted after a pause,
    /// until it lands or the orchestrator shuts down.
    async fn transition(&self, id: JobId, change: JobChange) -> Option<Job> {
        let target = change.target();
        let pause = Duration::from_millis(self.backoff.max_delay_ms).max(WAIT_INTERVAL);

        loop {
            let result = self
                .commit_policy
                .run_if(
                    &format!("commit job {} as {}", id, target),
                    |e: &StoreError| matches!(e, StoreError::Backend(_)),
                    |_| self.store.transition(id, JobState::Running, change.clone()),
                )
                .await;

            match result {
                Ok(job) => return Some(job),
                Err(StoreError::Conflict { actual, .. }) => {
                    debug!("Job {} is already {}, discarding {} result", id, actual, target);
                    return None;
                }
                Err(e @ StoreError::Backend(_)) => {
                    error!(
                        "Job {} could not be moved to {}: {}; it stays RUNNING, reattempting in {:?}",
                        id, target, e, pause
                    );
                    tokio::select! {
                        _ = sleep(pause) => {}
                        _ = self.shutdown.cancelled() => {
                            error!("Job {} left RUNNING at shutdown; {} was never recorded", id, target);
                            return None;
                        }
                    }
                }
                Err(e) => {
                    error!("Job {} could not be moved to {}: {}", id, target, e);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_response_status_codes() {
        assert_eq!(PollResponse::Pending.http_status(), 202);
        assert_eq!(PollResponse::Running.http_status(), 202);
        assert_eq!(
            PollResponse::Success {
                result: RecipeDraft::default()
            }
            .http_status(),
            200
        );
        assert_eq!(
            PollResponse::Failure {
                error: "x".into()
            }
            .http_status(),
            500
        );
        assert_eq!(PollResponse::NotFound.http_status(), 404);
    }

    #[test]
    fn test_poll_response_serializes_with_status_tag() {
        let json = serde_json::to_value(PollResponse::Failure {
            error: "Unsupported content: no media".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "FAILURE");
        assert_eq!(json["error"], "Unsupported content: no media");

        let json = serde_json::to_value(PollResponse::Running).unwrap();
        assert_eq!(json, serde_json::json!({"status": "RUNNING"}));
    }

    #[test]
    fn test_poll_response_from_job() {
        let mut job = Job::new(ExtractionRequest::new("https://example.com"));
        assert_eq!(PollResponse::from_job(job.clone()), PollResponse::Pending);

        job.apply(JobChange::Start);
        job.apply(JobChange::Succeed(RecipeDraft {
            title: "Soup".into(),
            ..Default::default()
        }));
        match PollResponse::from_job(job) {
            PollResponse::Success { result } => assert_eq!(result.title, "Soup"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_ids_are_not_found() {
        assert!(parse_id("not-a-uuid").is_none());
        assert!(parse_id(&Uuid::new_v4().to_string()).is_some());
    }
}
