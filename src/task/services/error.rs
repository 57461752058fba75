//! Errors surfaced by task services.

use crate::coordination::{CacheError, LockError};
use crate::task::{
    domain::{TaskDomainError, TaskId},
    ports::TaskRepositoryError,
};
use thiserror::Error;

/// Service-level errors for task commands and queries.
#[derive(Debug, Clone, Error)]
pub enum TaskServiceError {
    /// Input failed validation; retrying the same input cannot succeed.
    #[error(transparent)]
    Validation(#[from] TaskDomainError),

    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Another caller is updating the task; retry after a short wait.
    #[error("task {0} is being updated")]
    Conflict(TaskId),

    /// The store of record failed; the transaction was rolled back.
    #[error(transparent)]
    Store(TaskRepositoryError),

    /// The shared coordination store failed.
    #[error(transparent)]
    Coordination(#[from] LockError),

    /// The committed write could not invalidate its cache entry; readers may
    /// see the previous state until the entry expires.
    #[error("cache invalidation failed: {0}")]
    Cache(#[from] CacheError),
}

impl From<TaskRepositoryError> for TaskServiceError {
    fn from(err: TaskRepositoryError) -> Self {
        match err {
            TaskRepositoryError::NotFound(id) => Self::NotFound(id),
            TaskRepositoryError::Rejected(err) => Self::Validation(err),
            other => Self::Store(other),
        }
    }
}

/// Result type for task service operations.
pub type TaskServiceResult<T> = Result<T, TaskServiceError>;
