//! Validation and state-transition rules for tasks.

use super::{
    CreateTaskRequest, Task, TaskDomainError, TaskPatch, TaskPriority, TaskStatus, UpdatePolicy,
    UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use mockable::Clock;

/// Creation input that has passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTaskInput {
    /// Non-empty title.
    pub title: String,
    /// Description, empty when none was given.
    pub description: String,
    /// Requested priority, `Medium` when none was given.
    pub priority: TaskPriority,
    /// Parsed due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Owner reference.
    pub user_id: UserId,
}

/// Outcome of applying a [`TaskPatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    /// The task with every accepted field applied.
    pub task: Task,
    /// Fields skipped under [`UpdatePolicy::Permissive`].
    pub rejected: Vec<TaskDomainError>,
}

/// Parses a due date given as an RFC 3339 timestamp or a `YYYY-MM-DD` date.
///
/// Plain dates resolve to midnight UTC.
///
/// # Errors
///
/// Returns [`TaskDomainError::InvalidDueDate`] when neither form matches.
pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, TaskDomainError> {
    let trimmed = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| TaskDomainError::InvalidDueDate(raw.to_owned()))
}

/// Returns the value unless it is blank.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|raw| !raw.trim().is_empty())
}

/// Validates a creation request.
///
/// Checks run in a fixed order: title, due date, priority, status, owner.
/// A supplied status must be valid even though creation ignores it.
///
/// # Errors
///
/// Returns the [`TaskDomainError`] for the first failing check.
pub fn validate_creation(
    request: &CreateTaskRequest,
) -> Result<ValidatedTaskInput, TaskDomainError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(TaskDomainError::EmptyTitle);
    }

    let due_date = present(request.due_date.as_deref())
        .map(parse_due_date)
        .transpose()?;
    let priority = present(request.priority.as_deref())
        .map(TaskPriority::try_from)
        .transpose()?
        .unwrap_or_default();
    if let Some(status) = present(request.status.as_deref()) {
        TaskStatus::try_from(status)?;
    }
    let user_id = request
        .user_id
        .as_deref()
        .ok_or(TaskDomainError::MissingOwner)
        .and_then(UserId::new)?;

    Ok(ValidatedTaskInput {
        title: title.to_owned(),
        description: request.description.clone().unwrap_or_default(),
        priority,
        due_date,
        user_id,
    })
}

/// Builds a new task from validated input.
///
/// The status is always [`TaskStatus::Pending`].
#[must_use]
pub fn create_from_input(input: ValidatedTaskInput, clock: &impl Clock) -> Task {
    Task::new_pending(
        input.title,
        input.description,
        input.priority,
        input.due_date,
        input.user_id,
        clock,
    )
}

/// Routes a field through validation according to the update policy.
fn screen<T>(
    outcome: Result<T, TaskDomainError>,
    policy: UpdatePolicy,
    rejected: &mut Vec<TaskDomainError>,
) -> Result<Option<T>, TaskDomainError> {
    match (outcome, policy) {
        (Ok(value), _) => Ok(Some(value)),
        (Err(err), UpdatePolicy::Strict) => Err(err),
        (Err(err), UpdatePolicy::Permissive) => {
            rejected.push(err);
            Ok(None)
        }
    }
}

fn non_empty_title(raw: &str) -> Result<String, TaskDomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TaskDomainError::EmptyTitle);
    }
    Ok(trimmed.to_owned())
}

/// Overlays `patch` onto `task`. Patch values win; unset fields are kept.
///
/// Every field is validated exactly as at creation. Under
/// [`UpdatePolicy::Strict`] the first invalid field rejects the update;
/// under [`UpdatePolicy::Permissive`] invalid fields are skipped and reported
/// in [`PatchResult::rejected`]. An invalid value is never applied.
///
/// # Errors
///
/// Returns the first [`TaskDomainError`] under the strict policy.
pub fn apply_update(
    mut task: Task,
    patch: &TaskPatch,
    policy: UpdatePolicy,
    clock: &impl Clock,
) -> Result<PatchResult, TaskDomainError> {
    let mut rejected = Vec::new();

    let title = patch
        .title
        .as_deref()
        .map(|raw| screen(non_empty_title(raw), policy, &mut rejected))
        .transpose()?
        .flatten();
    let status = patch
        .status
        .as_deref()
        .map(|raw| screen(TaskStatus::try_from(raw), policy, &mut rejected))
        .transpose()?
        .flatten();
    let priority = patch
        .priority
        .as_deref()
        .map(|raw| screen(TaskPriority::try_from(raw), policy, &mut rejected))
        .transpose()?
        .flatten();
    let due_date = patch
        .due_date
        .as_deref()
        .map(|raw| screen(parse_due_date(raw), policy, &mut rejected))
        .transpose()?
        .flatten();
    let user_id = patch
        .user_id
        .as_deref()
        .map(|raw| screen(UserId::new(raw), policy, &mut rejected))
        .transpose()?
        .flatten();

    if let Some(value) = title {
        task.set_title(value);
    }
    if let Some(value) = patch.description.clone() {
        task.set_description(value);
    }
    if let Some(value) = status {
        task.set_raw_status(value);
    }
    if let Some(value) = priority {
        task.set_priority(value);
    }
    if let Some(value) = due_date {
        task.set_due_date(value);
    }
    if let Some(value) = user_id {
        task.set_owner(value);
    }
    task.touch(clock);

    Ok(PatchResult { task, rejected })
}

/// Replaces the task status after validating the requested name.
///
/// Any member of the status set may follow any other.
///
/// # Errors
///
/// Returns [`TaskDomainError::InvalidStatus`] when `new_status` is not a
/// known status.
pub fn transition_status(
    mut task: Task,
    new_status: &str,
    clock: &impl Clock,
) -> Result<Task, TaskDomainError> {
    let status = TaskStatus::try_from(new_status)?;
    task.set_status(status, clock);
    Ok(task)
}
