//! In-memory job queue for tests and single-process deployments.

use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::queue::{
    domain::{Job, JobId, JobOptions, JobOutcome, JobPayload, JobState},
    ports::{JobQueue, JobQueueError, JobQueueResult},
};

/// Thread-safe in-memory job queue.
///
/// Jobs are kept in enqueue order and reserved in that order among those
/// whose backoff delay has elapsed. Clones share the same queue.
pub struct InMemoryJobQueue<C = DefaultClock>
where
    C: Clock + Send + Sync,
{
    jobs: Arc<Mutex<Vec<Job>>>,
    clock: Arc<C>,
}

impl<C> Clone for InMemoryJobQueue<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl InMemoryJobQueue<DefaultClock> {
    /// Creates an empty queue driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }
}

impl Default for InMemoryJobQueue<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InMemoryJobQueue<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty queue using the given clock for backoff decisions.
    #[must_use]
    pub fn with_clock(clock: Arc<C>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            clock,
        }
    }

    /// Returns a snapshot of every retained job in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns [`JobQueueError::Backend`] when the queue lock is poisoned.
    pub fn snapshot(&self) -> JobQueueResult<Vec<Job>> {
        Ok(self.lock_jobs()?.clone())
    }

    fn lock_jobs(&self) -> JobQueueResult<MutexGuard<'_, Vec<Job>>> {
        self.jobs
            .lock()
            .map_err(|err| JobQueueError::backend(std::io::Error::other(err.to_string())))
    }
}

fn active_position(jobs: &[Job], id: JobId) -> JobQueueResult<usize> {
    jobs.iter()
        .position(|job| job.id() == id && job.state() == JobState::Active)
        .ok_or(JobQueueError::NotActive(id))
}

#[async_trait]
impl<C> JobQueue for InMemoryJobQueue<C>
where
    C: Clock + Send + Sync,
{
    async fn enqueue(&self, payload: JobPayload, options: JobOptions) -> JobQueueResult<JobId> {
        let job = Job::new(payload, options, &*self.clock);
        let id = job.id();
        self.lock_jobs()?.push(job);
        Ok(id)
    }

    async fn reserve(&self) -> JobQueueResult<Option<Job>> {
        let now = self.clock.utc();
        let mut jobs = self.lock_jobs()?;
        let Some(job) = jobs.iter_mut().find(|job| job.is_ready_at(now)) else {
            return Ok(None);
        };
        job.activate();
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: JobId, outcome: &JobOutcome) -> JobQueueResult<()> {
        let mut jobs = self.lock_jobs()?;
        let position = active_position(&jobs, id)?;
        match outcome {
            JobOutcome::Succeeded(_) => {
                jobs.remove(position);
            }
            JobOutcome::Failed { reason } => {
                if let Some(job) = jobs.get_mut(position) {
                    job.mark_failed(reason.clone());
                }
            }
        }
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> JobQueueResult<JobState> {
        let now = self.clock.utc();
        let mut jobs = self.lock_jobs()?;
        let position = active_position(&jobs, id)?;
        let job = jobs
            .get_mut(position)
            .ok_or(JobQueueError::NotActive(id))?;
        Ok(job.record_failure(error, now))
    }

    async fn find(&self, id: JobId) -> JobQueueResult<Option<Job>> {
        Ok(self.lock_jobs()?.iter().find(|job| job.id() == id).cloned())
    }

    async fn failed_jobs(&self) -> JobQueueResult<Vec<Job>> {
        Ok(self
            .lock_jobs()?
            .iter()
            .filter(|job| job.state() == JobState::Failed)
            .cloned()
            .collect())
    }
}
