//! Error types for task domain validation and parsing.

use thiserror::Error;

/// Validation failures raised by the task domain.
///
/// These are always the caller's fault and are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task title is empty after trimming.
    #[error("task title is required")]
    EmptyTitle,

    /// The due date is not a recognised timestamp or date.
    #[error("invalid due date format: {0}")]
    InvalidDueDate(String),

    /// The priority is outside the supported set.
    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    /// The status is outside the supported set.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// The owning user identifier is missing or blank.
    #[error("user ID is required")]
    MissingOwner,

    /// The batch action is not supported.
    #[error("unsupported batch action: {0}")]
    InvalidBatchAction(String),

    /// Page numbers start at one.
    #[error("page must be at least 1, got {0}")]
    InvalidPage(u32),

    /// Page sizes must be positive.
    #[error("limit must be at least 1, got {0}")]
    InvalidLimit(u32),

    /// The sort field is not supported.
    #[error("unsupported sort field: {0}")]
    InvalidSortField(String),

    /// The sort direction is neither ascending nor descending.
    #[error("unsupported sort order: {0}")]
    InvalidSortOrder(String),
}
