//! Durable queue port.

use crate::queue::domain::{Job, JobId, JobOptions, JobOutcome, JobPayload, JobState};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for queue operations.
pub type JobQueueResult<T> = Result<T, JobQueueError>;

/// Durable, at-least-once job queue.
///
/// Delivery order is not guaranteed. A job is handed to at most one
/// consumer at a time through [`JobQueue::reserve`].
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Adds a job and returns its identifier.
    async fn enqueue(&self, payload: JobPayload, options: JobOptions) -> JobQueueResult<JobId>;

    /// Reserves the next job ready for delivery, marking it active.
    async fn reserve(&self) -> JobQueueResult<Option<Job>>;

    /// Records the handler's outcome for an active job.
    ///
    /// Successful jobs are removed; reported failures are retained as
    /// failed without retry.
    async fn complete(&self, id: JobId, outcome: &JobOutcome) -> JobQueueResult<()>;

    /// Records a raised error for an active job.
    ///
    /// Returns [`JobState::Waiting`] when a retry was scheduled after the
    /// backoff delay, or [`JobState::Failed`] when attempts are exhausted.
    async fn fail(&self, id: JobId, error: &str) -> JobQueueResult<JobState>;

    /// Looks up a retained job.
    async fn find(&self, id: JobId) -> JobQueueResult<Option<Job>>;

    /// Returns jobs retained in the failed state.
    async fn failed_jobs(&self) -> JobQueueResult<Vec<Job>>;
}

/// Errors returned by queue implementations.
#[derive(Debug, Clone, Error)]
pub enum JobQueueError {
    /// The job does not exist or is not active.
    #[error("job {0} is not active")]
    NotActive(JobId),

    /// Backend failure.
    #[error("queue backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl JobQueueError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
