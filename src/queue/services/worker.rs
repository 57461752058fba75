//! Polling consumer that runs jobs with bounded concurrency.

use crate::queue::{
    domain::{Job, JobHandlerError, JobOutcome, JobState},
    ports::{JobHandler, JobQueue, JobQueueResult},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Worker tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Maximum handlers running at once; values below one are treated as one.
    pub concurrency: usize,
    /// Wait between polls when the queue has nothing ready.
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Queue consumer.
///
/// A job failure never stops the worker: reported failures and raised
/// errors are both settled against the queue and the loop moves on.
pub struct QueueWorker<Q, H>
where
    Q: JobQueue + 'static,
    H: JobHandler + 'static,
{
    queue: Arc<Q>,
    handler: Arc<H>,
    settings: WorkerSettings,
}

impl<Q, H> QueueWorker<Q, H>
where
    Q: JobQueue + 'static,
    H: JobHandler + 'static,
{
    /// Creates a worker with default settings.
    #[must_use]
    pub fn new(queue: Arc<Q>, handler: Arc<H>) -> Self {
        Self {
            queue,
            handler,
            settings: WorkerSettings::default(),
        }
    }

    /// Replaces the worker settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Handles ready jobs one at a time until none is ready.
    ///
    /// Returns the number of jobs settled. Jobs rescheduled with a backoff
    /// delay are not ready and end the drain.
    ///
    /// # Errors
    ///
    /// Returns [`crate::queue::ports::JobQueueError`] when the queue fails.
    pub async fn drain(&self) -> JobQueueResult<usize> {
        let mut settled = 0_usize;
        while let Some(job) = self.queue.reserve().await? {
            let result = self.handler.handle(&job).await;
            settle(&*self.queue, &job, result).await?;
            settled += 1;
        }
        Ok(settled)
    }

    /// Polls the queue until `shutdown` turns `true` or its sender is
    /// dropped, then waits for in-flight jobs to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut in_flight = JoinSet::new();
        info!(concurrency = self.settings.concurrency, "queue worker started");

        while !*shutdown.borrow() {
            let permit = tokio::select! {
                acquired = Arc::clone(&permits).acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match self.queue.reserve().await {
                Ok(Some(job)) => {
                    let queue = Arc::clone(&self.queue);
                    let handler = Arc::clone(&self.handler);
                    in_flight.spawn(async move {
                        let result = handler.handle(&job).await;
                        if let Err(err) = settle(&*queue, &job, result).await {
                            error!(job_id = %job.id(), error = %err, "failed to settle job");
                        }
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    if idle(&mut shutdown, self.settings.poll_interval).await {
                        break;
                    }
                }
                Err(err) => {
                    drop(permit);
                    warn!(error = %err, "job reservation failed");
                    if idle(&mut shutdown, self.settings.poll_interval).await {
                        break;
                    }
                }
            }
            reap(&mut in_flight);
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "job task aborted");
            }
        }
        info!("queue worker stopped");
    }
}

/// Sleeps for `interval`, returning `true` when shutdown was requested.
async fn idle(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(interval) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

fn reap(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.try_join_next() {
        if let Err(err) = joined {
            error!(error = %err, "job task aborted");
        }
    }
}

async fn settle<Q>(
    queue: &Q,
    job: &Job,
    result: Result<JobOutcome, JobHandlerError>,
) -> JobQueueResult<()>
where
    Q: JobQueue + ?Sized,
{
    match result {
        Ok(outcome) => {
            match &outcome {
                JobOutcome::Succeeded(_) => {
                    info!(job_id = %job.id(), kind = %job.payload().kind(), "job completed");
                }
                JobOutcome::Failed { reason } => {
                    warn!(job_id = %job.id(), reason = %reason, "job reported failure");
                }
            }
            queue.complete(job.id(), &outcome).await
        }
        Err(err) => {
            error!(
                job_id = %job.id(),
                attempt = job.attempts_made() + 1,
                error = %err,
                "job handler failed"
            );
            let state = queue.fail(job.id(), &err.message).await?;
            if state == JobState::Failed {
                warn!(job_id = %job.id(), "job exhausted its retries");
            }
            Ok(())
        }
    }
}
