//! Domain model for task lifecycle management.
//!
//! Everything here is pure: validation, construction, patch application and
//! status transitions take their inputs and a clock and return values or
//! [`TaskDomainError`]s without touching storage.

mod error;
mod ids;
mod input;
mod query;
mod rules;
mod task;

pub use error::TaskDomainError;
pub use ids::{TaskId, UserId};
pub use input::{BatchAction, CreateTaskRequest, TaskPatch, UpdatePolicy};
pub use query::{
    Pagination, SortOrder, TaskFilter, TaskListQuery, TaskPage, TaskSort, TaskSortField,
    TaskStats,
};
pub use rules::{
    PatchResult, ValidatedTaskInput, apply_update, create_from_input, parse_due_date,
    transition_status, validate_creation,
};
pub use task::{PersistedTaskData, Task, TaskPriority, TaskStatus};
