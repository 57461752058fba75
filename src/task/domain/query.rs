//! Listing, filtering, and aggregate read models.

use super::{Task, TaskDomainError, TaskPriority, TaskStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

impl TryFrom<&str> for SortOrder {
    type Error = TaskDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(TaskDomainError::InvalidSortOrder(value.to_owned())),
        }
    }
}

/// Column a task listing can be sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskSortField {
    /// Creation timestamp.
    #[default]
    CreatedAt,
    /// Latest modification timestamp.
    UpdatedAt,
    /// Due date; tasks without one sort as if due last.
    DueDate,
    /// Priority in `low < medium < high` order.
    Priority,
    /// Status in lifecycle order.
    Status,
    /// Title.
    Title,
}

impl TryFrom<&str> for TaskSortField {
    type Error = TaskDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|ch| *ch != '_')
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "createdat" => Ok(Self::CreatedAt),
            "updatedat" => Ok(Self::UpdatedAt),
            "duedate" => Ok(Self::DueDate),
            "priority" => Ok(Self::Priority),
            "status" => Ok(Self::Status),
            "title" => Ok(Self::Title),
            _ => Err(TaskDomainError::InvalidSortField(value.to_owned())),
        }
    }
}

/// Sort key and direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSort {
    /// Column to sort by.
    pub field: TaskSortField,
    /// Direction.
    pub order: SortOrder,
}

impl TaskSort {
    /// Creates a sort order over `field`.
    #[must_use]
    pub const fn new(field: TaskSortField, order: SortOrder) -> Self {
        Self { field, order }
    }
}

/// One-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Pagination {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 10;

    /// Creates a validated page request.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidPage`] or
    /// [`TaskDomainError::InvalidLimit`] when either value is zero.
    pub const fn new(page: u32, limit: u32) -> Result<Self, TaskDomainError> {
        if page == 0 {
            return Err(TaskDomainError::InvalidPage(page));
        }
        if limit == 0 {
            return Err(TaskDomainError::InvalidLimit(limit));
        }
        Ok(Self { page, limit })
    }

    /// Returns the one-indexed page number.
    #[must_use]
    pub const fn page(self) -> u32 {
        self.page
    }

    /// Returns the page size.
    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit
    }

    /// Returns how many rows precede this page.
    #[must_use]
    pub fn offset(self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Conjunctive task filter. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Exact status.
    pub status: Option<TaskStatus>,
    /// Exact priority.
    pub priority: Option<TaskPriority>,
    /// Exact owner.
    pub user_id: Option<UserId>,
    /// Due strictly before this instant.
    pub due_before: Option<DateTime<Utc>>,
}

impl TaskFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one status.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to one priority.
    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Restricts to one owner.
    #[must_use]
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Restricts to tasks due before `instant`.
    #[must_use]
    pub fn with_due_before(mut self, instant: DateTime<Utc>) -> Self {
        self.due_before = Some(instant);
        self
    }

    /// Returns whether `task` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|status| task.status() == status)
            && self.priority.is_none_or(|priority| task.priority() == priority)
            && self
                .user_id
                .as_ref()
                .is_none_or(|user_id| task.user_id() == user_id)
            && self
                .due_before
                .is_none_or(|limit| task.due_date().is_some_and(|due| due < limit))
    }
}

/// Full listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListQuery {
    /// Page to return.
    pub pagination: Pagination,
    /// Ordering.
    pub sort: TaskSort,
    /// Filter criteria.
    pub filter: TaskFilter,
}

impl TaskListQuery {
    /// Creates a listing request.
    #[must_use]
    pub const fn new(pagination: Pagination, sort: TaskSort, filter: TaskFilter) -> Self {
        Self {
            pagination,
            sort,
            filter,
        }
    }
}

/// One page of listed tasks with totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    /// Tasks on this page.
    pub items: Vec<Task>,
    /// Tasks matching the filter across all pages.
    pub total: u64,
    /// One-indexed page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// `ceil(total / limit)`.
    pub total_pages: u64,
}

impl TaskPage {
    /// Assembles a page and derives the page count.
    #[must_use]
    pub fn new(items: Vec<Task>, total: u64, pagination: Pagination) -> Self {
        let limit = u64::from(pagination.limit());
        Self {
            items,
            total,
            page: pagination.page(),
            limit: pagination.limit(),
            total_pages: total.div_ceil(limit),
        }
    }
}

/// Aggregate task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    /// All tasks.
    pub total: u64,
    /// Completed tasks.
    pub completed: u64,
    /// Tasks in progress.
    pub in_progress: u64,
    /// Pending tasks.
    pub pending: u64,
    /// High-priority tasks of any status.
    pub high_priority: u64,
}
