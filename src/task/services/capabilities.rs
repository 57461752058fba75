//! Read and write capability traits over the task services.

use super::TaskServiceResult;
use crate::task::domain::{
    BatchAction, CreateTaskRequest, Task, TaskId, TaskListQuery, TaskPage, TaskPatch, TaskStats,
    TaskStatus,
};
use async_trait::async_trait;

/// Per-item result of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchItemResult {
    /// Requested task.
    pub task_id: TaskId,
    /// What happened to it.
    pub outcome: BatchItemOutcome,
}

impl BatchItemResult {
    /// Returns whether the action was applied to this task.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.outcome, BatchItemOutcome::NotFound)
    }
}

/// Outcome for one task in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchItemOutcome {
    /// The task now has status [`TaskStatus::Completed`].
    Completed,
    /// The task was removed.
    Deleted,
    /// No task exists with the requested ID.
    NotFound,
}

/// Write-side task operations.
#[async_trait]
pub trait TaskMutator: Send + Sync {
    /// Validates and persists a new pending task, then emits a creation job.
    async fn create(&self, request: CreateTaskRequest) -> TaskServiceResult<Task>;

    /// Applies a patch to a task under its per-task lock.
    ///
    /// Fails with a conflict, without waiting, when another caller holds
    /// the lock.
    async fn update(&self, id: TaskId, patch: TaskPatch) -> TaskServiceResult<Task>;

    /// Removes a task and emits a deletion job.
    async fn delete(&self, id: TaskId) -> TaskServiceResult<()>;

    /// Applies `action` to every found task, reporting one result per
    /// requested ID. Only a store failure fails the whole call.
    async fn batch_process(
        &self,
        ids: &[TaskId],
        action: BatchAction,
    ) -> TaskServiceResult<Vec<BatchItemResult>>;

    /// Sets a task's status from its name and emits a status-changed job.
    async fn update_status(&self, id: TaskId, status: &str) -> TaskServiceResult<Task>;

    /// Sets a task's status without emitting a job.
    ///
    /// Used by job handlers so that acting on a status-changed job does not
    /// enqueue another one.
    async fn apply_status_change(&self, id: TaskId, status: TaskStatus)
    -> TaskServiceResult<Task>;
}

/// Read-side task operations.
#[async_trait]
pub trait TaskReader: Send + Sync {
    /// Returns a task by ID through the read-through cache.
    async fn get_by_id(&self, id: TaskId) -> TaskServiceResult<Option<Task>>;

    /// Returns one filtered, sorted page of tasks.
    async fn list(&self, query: &TaskListQuery) -> TaskServiceResult<TaskPage>;

    /// Returns every existing task among `ids`, in no particular order.
    async fn get_by_ids(&self, ids: &[TaskId]) -> TaskServiceResult<Vec<Task>>;

    /// Returns aggregate counts over all tasks.
    async fn stats(&self) -> TaskServiceResult<TaskStats>;
}
