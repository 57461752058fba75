//! Application services for the task lifecycle.
//!
//! Writes go through [`TaskCommandService`], which owns the lock, cache
//! invalidation and job emission discipline. Reads go through
//! [`TaskQueryService`]. Consumers that only need one side depend on the
//! [`TaskMutator`] or [`TaskReader`] capability instead of a concrete
//! service.

mod capabilities;
mod command;
mod error;
mod query;

pub use capabilities::{BatchItemOutcome, BatchItemResult, TaskMutator, TaskReader};
pub use command::{TaskCommandService, TaskCommandSettings};
pub use error::{TaskServiceError, TaskServiceResult};
pub use query::TaskQueryService;

/// Cache and lock resource name for tasks.
pub(crate) const TASK_RESOURCE: &str = "task";
