//! Inbound port through which workers hand jobs to domain logic.

use crate::queue::domain::{Job, JobHandlerError, JobOutcome};
use async_trait::async_trait;

/// Executes one reserved job.
///
/// Returning `Ok` with a failed [`JobOutcome`] finishes the job for good;
/// returning `Err` asks the queue to retry it with backoff.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handles `job` and reports its outcome.
    async fn handle(&self, job: &Job) -> Result<JobOutcome, JobHandlerError>;
}
