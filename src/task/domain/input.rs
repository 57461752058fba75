//! Untyped inputs accepted from the request layer.
//!
//! Fields arrive as raw strings and are only turned into domain values by
//! the validation rules in [`super::rules`].

use super::TaskDomainError;
use serde::{Deserialize, Serialize};

/// Request payload for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Caller-supplied status; validated but ignored on creation.
    pub status: Option<String>,
    /// Optional priority name.
    pub priority: Option<String>,
    /// Optional due date as RFC 3339 timestamp or `YYYY-MM-DD`.
    pub due_date: Option<String>,
    /// Owning user identifier.
    pub user_id: Option<String>,
}

impl CreateTaskRequest {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(title: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets a requested status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Sets the due date.
    #[must_use]
    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }

    /// Clears the owner, producing a request that fails validation.
    #[must_use]
    pub fn without_owner(mut self) -> Self {
        self.user_id = None;
        self
    }
}

/// Partial update of a task. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement status name.
    pub status: Option<String>,
    /// Replacement priority name.
    pub priority: Option<String>,
    /// Replacement due date.
    pub due_date: Option<String>,
    /// Replacement owner.
    pub user_id: Option<String>,
}

impl TaskPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the replacement title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the replacement description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the replacement status.
    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the replacement priority.
    #[must_use]
    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Sets the replacement due date.
    #[must_use]
    pub fn due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }

    /// Sets the replacement owner.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// How patch fields that fail validation are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Reject the whole update on the first invalid field.
    #[default]
    Strict,
    /// Skip invalid fields and apply the rest.
    Permissive,
}

/// Bulk operation applied by a batch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchAction {
    /// Mark every task completed.
    Complete,
    /// Remove every task.
    Delete,
}

impl BatchAction {
    /// Returns the canonical action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Delete => "delete",
        }
    }
}

impl TryFrom<&str> for BatchAction {
    type Error = TaskDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(Self::Complete),
            "delete" => Ok(Self::Delete),
            _ => Err(TaskDomainError::InvalidBatchAction(value.to_owned())),
        }
    }
}
