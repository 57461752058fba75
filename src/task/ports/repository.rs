//! Repository port for the task store of record.

use crate::task::domain::{Task, TaskDomainError, TaskId, TaskListQuery, TaskPage, TaskStats};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Edit applied to one task inside [`TaskRepository::modify`].
///
/// Returning an error aborts the transaction without writing.
pub type TaskEdit = Box<dyn FnOnce(Task) -> Result<Task, TaskDomainError> + Send>;

/// Edit applied to every task inside [`TaskRepository::modify_many`].
pub type BatchEdit = Box<dyn Fn(Task) -> Task + Send + Sync>;

/// A task as it was before and after one [`TaskRepository::modify`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRevision {
    /// State read under the row lock.
    pub previous: Task,
    /// State written back.
    pub current: Task,
}

/// Task persistence contract.
///
/// Every mutating method is a single transaction: it either applies fully
/// or leaves the store untouched.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the task ID already
    /// exists.
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Loads a task, applies `edit` and writes the result back as one unit
    /// of work.
    ///
    /// No other write to the same task can land between the read and the
    /// write: adapters hold a row lock or an exclusive state lock across the
    /// whole call.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not
    /// exist, or [`TaskRepositoryError::Rejected`] when `edit` fails, in
    /// which case nothing is written.
    async fn modify(&self, id: TaskId, edit: TaskEdit) -> TaskRepositoryResult<TaskRevision>;

    /// Applies `edit` to every existing task in `ids` in one transaction and
    /// returns the written tasks. Missing IDs are ignored.
    async fn modify_many(&self, ids: &[TaskId], edit: BatchEdit)
    -> TaskRepositoryResult<Vec<Task>>;

    /// Removes a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn remove(&self, id: TaskId) -> TaskRepositoryResult<()>;

    /// Removes several tasks in one transaction and returns the IDs that
    /// existed. Missing IDs are ignored.
    async fn remove_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<TaskId>>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Finds every task whose ID is in `ids`, in no particular order.
    ///
    /// Missing IDs are simply absent from the result.
    async fn find_by_ids(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns one filtered, sorted page of tasks plus the total match count.
    async fn list(&self, query: &TaskListQuery) -> TaskRepositoryResult<TaskPage>;

    /// Returns aggregate counts over all tasks.
    async fn stats(&self) -> TaskRepositoryResult<TaskStats>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// An edit refused the loaded task; nothing was written.
    #[error(transparent)]
    Rejected(TaskDomainError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
