//! Periodic trigger for overdue sweeps.

use crate::queue::{
    domain::{JobId, JobOptions, JobPayload},
    ports::{JobQueue, JobQueueResult},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Scanner tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerSettings {
    /// Time between sweeps.
    pub period: Duration,
    /// Options attached to each sweep job.
    pub job_options: JobOptions,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(3600),
            job_options: JobOptions::default(),
        }
    }
}

/// Enqueues one overdue sweep job per period.
///
/// The scan itself runs in a queue consumer so it gets the same retry and
/// concurrency limits as any other job.
pub struct OverdueScanner<Q>
where
    Q: JobQueue,
{
    queue: Arc<Q>,
    settings: ScannerSettings,
}

impl<Q> OverdueScanner<Q>
where
    Q: JobQueue,
{
    /// Creates a scanner with default settings.
    #[must_use]
    pub fn new(queue: Arc<Q>) -> Self {
        Self {
            queue,
            settings: ScannerSettings::default(),
        }
    }

    /// Replaces the scanner settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: ScannerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Enqueues a single sweep job.
    ///
    /// # Errors
    ///
    /// Returns [`crate::queue::ports::JobQueueError`] when the enqueue fails.
    pub async fn run_once(&self) -> JobQueueResult<JobId> {
        let job_id = self
            .queue
            .enqueue(JobPayload::OverdueSweep, self.settings.job_options)
            .await?;
        info!(job_id = %job_id, "overdue sweep scheduled");
        Ok(job_id)
    }

    /// Schedules a sweep immediately and then once per period until
    /// `shutdown` turns `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.settings.period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        warn!(error = %err, "overdue sweep not scheduled");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
