//! Dispatches jobs to their handlers.

use crate::queue::{
    domain::{
        Job, JobHandlerError, JobId, JobOptions, JobOutcome, JobPayload, JobReport,
        NotificationResult, SweepItemResult, SweepReport,
    },
    ports::{JobHandler, JobQueue, Notifier},
};
use crate::task::{
    domain::{
        Pagination, SortOrder, Task, TaskFilter, TaskId, TaskListQuery, TaskSort, TaskSortField,
        TaskStatus,
    },
    services::{TaskMutator, TaskReader},
};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Overdue sweep tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    /// Tasks fetched per page; values below one are treated as one.
    pub batch_size: u32,
    /// Options attached to each notification job.
    pub notification_options: JobOptions,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            notification_options: JobOptions::default(),
        }
    }
}

/// Job processor for every [`JobPayload`] kind.
///
/// Depends only on the task read and write capabilities, so it never
/// bypasses the command service's cache invalidation.
pub struct TaskProcessor<M, R, Q, N, C = DefaultClock>
where
    M: TaskMutator,
    R: TaskReader,
    Q: JobQueue,
    N: Notifier,
    C: Clock + Send + Sync,
{
    mutator: Arc<M>,
    reader: Arc<R>,
    queue: Arc<Q>,
    notifier: Arc<N>,
    clock: Arc<C>,
    settings: SweepSettings,
}

impl<M, R, Q, N, C> TaskProcessor<M, R, Q, N, C>
where
    M: TaskMutator,
    R: TaskReader,
    Q: JobQueue,
    N: Notifier,
    C: Clock + Send + Sync,
{
    /// Creates a processor with default sweep settings.
    #[must_use]
    pub fn new(
        mutator: Arc<M>,
        reader: Arc<R>,
        queue: Arc<Q>,
        notifier: Arc<N>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            mutator,
            reader,
            queue,
            notifier,
            clock,
            settings: SweepSettings::default(),
        }
    }

    /// Replaces the sweep settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: SweepSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runs the handler for `job`.
    ///
    /// A job that has used up its attempts is reported as failed without
    /// running its handler.
    ///
    /// # Errors
    ///
    /// Returns [`JobHandlerError`] when the handler hit a failure the queue
    /// should retry.
    pub async fn process(&self, job: &Job) -> Result<JobOutcome, JobHandlerError> {
        if job.attempts_exhausted() {
            warn!(
                job_id = %job.id(),
                attempts = job.attempts_made(),
                "job reached its attempt ceiling; not running"
            );
            return Ok(JobOutcome::failed(format!(
                "job {} exhausted {} attempts",
                job.id(),
                job.attempts_made()
            )));
        }

        debug!(
            job_id = %job.id(),
            kind = %job.payload().kind(),
            attempt = job.attempts_made() + 1,
            "dispatching job"
        );
        match job.payload() {
            JobPayload::TaskCreated { task_id, .. } => {
                self.observe_created(job.id(), *task_id).await
            }
            JobPayload::TaskStatusChanged { task_id, status } => {
                Ok(self.change_status(*task_id, *status).await)
            }
            JobPayload::TaskDeleted { task_id } => Ok(JobOutcome::Succeeded(
                JobReport::TaskDeleted { task_id: *task_id },
            )),
            JobPayload::OverdueSweep => self.sweep(job.id()).await,
            JobPayload::Notification { task_id, message } => {
                self.deliver(job.id(), *task_id, message).await
            }
        }
    }

    async fn observe_created(
        &self,
        job_id: JobId,
        task_id: TaskId,
    ) -> Result<JobOutcome, JobHandlerError> {
        let found = self
            .reader
            .get_by_id(task_id)
            .await
            .map_err(|err| JobHandlerError::new(job_id, err))?;
        Ok(found.map_or_else(
            || JobOutcome::failed(format!("task {task_id} not found")),
            |task| {
                JobOutcome::Succeeded(JobReport::TaskCreated {
                    task_id,
                    status: task.status(),
                })
            },
        ))
    }

    async fn change_status(&self, task_id: TaskId, status: TaskStatus) -> JobOutcome {
        match self.mutator.apply_status_change(task_id, status).await {
            Ok(task) => JobOutcome::Succeeded(JobReport::StatusUpdated {
                task_id,
                new_status: task.status(),
            }),
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "status change job failed");
                JobOutcome::failed(err.to_string())
            }
        }
    }

    async fn deliver(
        &self,
        job_id: JobId,
        task_id: TaskId,
        message: &str,
    ) -> Result<JobOutcome, JobHandlerError> {
        self.notifier
            .notify(task_id, message)
            .await
            .map_err(|err| JobHandlerError::new(job_id, err))?;
        Ok(JobOutcome::Succeeded(JobReport::NotificationSent {
            task_id,
        }))
    }

    async fn sweep(&self, job_id: JobId) -> Result<JobOutcome, JobHandlerError> {
        let now = self.clock.utc();
        let filter = TaskFilter::new()
            .with_status(TaskStatus::Pending)
            .with_due_before(now);
        let sort = TaskSort::new(TaskSortField::DueDate, SortOrder::Asc);
        let batch_size = self.settings.batch_size.max(1);

        let mut report = SweepReport::default();
        let mut page_number = 1_u32;
        loop {
            let pagination = Pagination::new(page_number, batch_size)
                .map_err(|err| JobHandlerError::new(job_id, err))?;
            let query = TaskListQuery::new(pagination, sort, filter.clone());
            let page = self
                .reader
                .list(&query)
                .await
                .map_err(|err| JobHandlerError::new(job_id, err))?;
            if page.items.is_empty() {
                break;
            }
            report.pages += 1;
            for task in &page.items {
                let result = self.schedule_notification(task).await;
                report.results.push(SweepItemResult {
                    task_id: task.id(),
                    result,
                });
            }
            page_number = page_number.saturating_add(1);
        }

        info!(
            pages = report.pages,
            processed = report.processed(),
            scheduled = report.scheduled(),
            "overdue sweep finished"
        );
        Ok(JobOutcome::Succeeded(JobReport::Sweep(report)))
    }

    async fn schedule_notification(&self, task: &Task) -> NotificationResult {
        let due = task
            .due_date()
            .map_or_else(String::new, |instant| instant.to_rfc3339());
        let payload = JobPayload::Notification {
            task_id: task.id(),
            message: format!("Task {} is overdue (due: {due})", task.id()),
        };
        match self
            .queue
            .enqueue(payload, self.settings.notification_options)
            .await
        {
            Ok(job_id) => NotificationResult::Scheduled(job_id),
            Err(err) => {
                warn!(task_id = %task.id(), error = %err, "overdue notification not scheduled");
                NotificationResult::Failed(err.to_string())
            }
        }
    }
}

#[async_trait]
impl<M, R, Q, N, C> JobHandler for TaskProcessor<M, R, Q, N, C>
where
    M: TaskMutator,
    R: TaskReader,
    Q: JobQueue,
    N: Notifier,
    C: Clock + Send + Sync,
{
    async fn handle(&self, job: &Job) -> Result<JobOutcome, JobHandlerError> {
        self.process(job).await
    }
}
