//! Write-side orchestration: validate, lock, persist, invalidate, emit.

use super::{
    BatchItemOutcome, BatchItemResult, TASK_RESOURCE, TaskMutator, TaskServiceError,
    TaskServiceResult,
};
use crate::coordination::{Cache, LockError, LockManager, ports::KeyValueStore};
use crate::queue::{
    domain::{JobOptions, JobPayload},
    ports::JobQueue,
};
use crate::task::{
    domain::{
        BatchAction, CreateTaskRequest, Task, TaskDomainError, TaskId, TaskPatch, TaskStatus,
        UpdatePolicy, apply_update, create_from_input, transition_status, validate_creation,
    },
    ports::{TaskRepository, TaskRevision},
};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tunables for [`TaskCommandService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskCommandSettings {
    /// Lifetime of the per-task update lock.
    pub lock_ttl: Duration,
    /// How invalid patch fields are treated.
    pub update_policy: UpdatePolicy,
    /// Options attached to every emitted job.
    pub job_options: JobOptions,
}

impl TaskCommandSettings {
    /// Default update lock lifetime.
    pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);
}

impl Default for TaskCommandSettings {
    fn default() -> Self {
        Self {
            lock_ttl: Self::DEFAULT_LOCK_TTL,
            update_policy: UpdatePolicy::default(),
            job_options: JobOptions::default(),
        }
    }
}

/// Task command service.
///
/// Persistence is the commit point. Cache invalidation follows it before the
/// call returns; a failed invalidation is reported as
/// [`TaskServiceError::Cache`] even though the mutation stays committed.
/// Job emission is best-effort: its failures are logged and never undo or
/// fail the committed mutation.
pub struct TaskCommandService<R, S, Q, C = DefaultClock>
where
    R: TaskRepository,
    S: KeyValueStore,
    Q: JobQueue,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    locks: Arc<LockManager<S, C>>,
    cache: Arc<Cache<S>>,
    queue: Arc<Q>,
    clock: Arc<C>,
    settings: TaskCommandSettings,
}

impl<R, S, Q, C> TaskCommandService<R, S, Q, C>
where
    R: TaskRepository,
    S: KeyValueStore + 'static,
    Q: JobQueue,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a command service with default settings.
    #[must_use]
    pub fn new(
        repository: Arc<R>,
        locks: Arc<LockManager<S, C>>,
        cache: Arc<Cache<S>>,
        queue: Arc<Q>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            repository,
            locks,
            cache,
            queue,
            clock,
            settings: TaskCommandSettings::default(),
        }
    }

    /// Replaces the service settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: TaskCommandSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the active settings.
    #[must_use]
    pub const fn settings(&self) -> TaskCommandSettings {
        self.settings
    }

    async fn invalidate(&self, id: TaskId) -> TaskServiceResult<()> {
        let key = Cache::<S>::key_for(TASK_RESOURCE, id);
        self.cache.delete(&key).await.map_err(|err| {
            warn!(task_id = %id, error = %err, "cache invalidation failed");
            TaskServiceError::Cache(err)
        })
    }

    async fn emit(&self, payload: JobPayload) {
        let kind = payload.kind();
        let task_id = payload.task_id();
        match self.queue.enqueue(payload, self.settings.job_options).await {
            Ok(job_id) => debug!(job_id = %job_id, kind = %kind, "job enqueued"),
            Err(err) => warn!(
                kind = %kind,
                task_id = ?task_id,
                error = %err,
                "job enqueue failed after commit; side effect dropped"
            ),
        }
    }

    async fn update_locked(&self, id: TaskId, patch: TaskPatch) -> TaskServiceResult<Task> {
        let clock = Arc::clone(&self.clock);
        let policy = self.settings.update_policy;
        let TaskRevision { previous, current } = self
            .repository
            .modify(
                id,
                Box::new(move |task: Task| -> Result<Task, TaskDomainError> {
                    let patched = apply_update(task, &patch, policy, &*clock)?;
                    for rejected in &patched.rejected {
                        warn!(task_id = %id, reason = %rejected, "patch field skipped");
                    }
                    Ok(patched.task)
                }),
            )
            .await?;
        let invalidated = self.invalidate(id).await;
        if current.status() != previous.status() {
            self.emit(JobPayload::TaskStatusChanged {
                task_id: id,
                status: current.status(),
            })
            .await;
        }
        invalidated?;
        Ok(current)
    }

    /// Invalidates and announces every task a batch touched.
    ///
    /// Every job is emitted even when an invalidation fails; the first
    /// invalidation failure is returned afterwards.
    async fn settle_batch(
        &self,
        touched: &[TaskId],
        action: BatchAction,
    ) -> TaskServiceResult<()> {
        let mut first_failure = None;
        for &task_id in touched {
            if let Err(err) = self.invalidate(task_id).await {
                first_failure.get_or_insert(err);
            }
            let payload = match action {
                BatchAction::Complete => JobPayload::TaskStatusChanged {
                    task_id,
                    status: TaskStatus::Completed,
                },
                BatchAction::Delete => JobPayload::TaskDeleted { task_id },
            };
            self.emit(payload).await;
        }
        first_failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl<R, S, Q, C> TaskMutator for TaskCommandService<R, S, Q, C>
where
    R: TaskRepository,
    S: KeyValueStore + 'static,
    Q: JobQueue,
    C: Clock + Send + Sync + 'static,
{
    async fn create(&self, request: CreateTaskRequest) -> TaskServiceResult<Task> {
        let input = validate_creation(&request)?;
        let task = create_from_input(input, &*self.clock);
        self.repository.store(&task).await?;
        self.emit(JobPayload::TaskCreated {
            task_id: task.id(),
            status: task.status(),
        })
        .await;
        Ok(task)
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> TaskServiceResult<Task> {
        let key = LockManager::<S, C>::key_for(TASK_RESOURCE, id);
        let guard = match self.locks.lock(&key, self.settings.lock_ttl).await {
            Ok(guard) => guard,
            Err(LockError::Held { .. }) => {
                warn!(task_id = %id, "task is being updated");
                return Err(TaskServiceError::Conflict(id));
            }
            Err(err) => return Err(err.into()),
        };

        let result = self.update_locked(id, patch).await;
        if let Err(err) = guard.release().await {
            warn!(task_id = %id, error = %err, "lock release failed; waiting for TTL");
        }
        result
    }

    async fn delete(&self, id: TaskId) -> TaskServiceResult<()> {
        self.repository.remove(id).await?;
        let invalidated = self.invalidate(id).await;
        self.emit(JobPayload::TaskDeleted { task_id: id }).await;
        invalidated
    }

    async fn batch_process(
        &self,
        ids: &[TaskId],
        action: BatchAction,
    ) -> TaskServiceResult<Vec<BatchItemResult>> {
        let touched: Vec<TaskId> = match action {
            BatchAction::Complete => {
                let clock = Arc::clone(&self.clock);
                self.repository
                    .modify_many(
                        ids,
                        Box::new(move |mut task: Task| {
                            task.set_status(TaskStatus::Completed, &*clock);
                            task
                        }),
                    )
                    .await?
                    .iter()
                    .map(Task::id)
                    .collect()
            }
            BatchAction::Delete => self.repository.remove_many(ids).await?,
        };
        self.settle_batch(&touched, action).await?;

        let applied = match action {
            BatchAction::Complete => BatchItemOutcome::Completed,
            BatchAction::Delete => BatchItemOutcome::Deleted,
        };
        let touched: HashSet<TaskId> = touched.into_iter().collect();
        Ok(ids
            .iter()
            .map(|&task_id| BatchItemResult {
                task_id,
                outcome: if touched.contains(&task_id) {
                    applied
                } else {
                    BatchItemOutcome::NotFound
                },
            })
            .collect())
    }

    async fn update_status(&self, id: TaskId, status: &str) -> TaskServiceResult<Task> {
        let clock = Arc::clone(&self.clock);
        let requested = status.to_owned();
        let revision = self
            .repository
            .modify(
                id,
                Box::new(move |task: Task| transition_status(task, &requested, &*clock)),
            )
            .await?;
        let invalidated = self.invalidate(id).await;
        self.emit(JobPayload::TaskStatusChanged {
            task_id: id,
            status: revision.current.status(),
        })
        .await;
        invalidated?;
        Ok(revision.current)
    }

    async fn apply_status_change(
        &self,
        id: TaskId,
        status: TaskStatus,
    ) -> TaskServiceResult<Task> {
        let clock = Arc::clone(&self.clock);
        let revision = self
            .repository
            .modify(
                id,
                Box::new(move |mut task: Task| -> Result<Task, TaskDomainError> {
                    task.set_status(status, &*clock);
                    Ok(task)
                }),
            )
            .await?;
        self.invalidate(id).await?;
        Ok(revision.current)
    }
}
