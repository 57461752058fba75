//! Job aggregate and payload variants.

use super::JobOptions;
use crate::task::domain::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Creates a new random job identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a job identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work item carried by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum JobPayload {
    /// A task was created with the given initial status.
    TaskCreated {
        /// Created task.
        task_id: TaskId,
        /// Status at creation time.
        status: TaskStatus,
    },
    /// A task's status should become `status`.
    TaskStatusChanged {
        /// Affected task.
        task_id: TaskId,
        /// Target status.
        status: TaskStatus,
    },
    /// A task was deleted.
    TaskDeleted {
        /// Deleted task.
        task_id: TaskId,
    },
    /// Scan for overdue tasks and schedule notifications.
    OverdueSweep,
    /// Deliver a message about a task.
    Notification {
        /// Task the message concerns.
        task_id: TaskId,
        /// Message body.
        message: String,
    },
}

impl JobPayload {
    /// Returns the discriminant of this payload.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::TaskCreated { .. } => JobKind::TaskCreated,
            Self::TaskStatusChanged { .. } => JobKind::TaskStatusChanged,
            Self::TaskDeleted { .. } => JobKind::TaskDeleted,
            Self::OverdueSweep => JobKind::OverdueSweep,
            Self::Notification { .. } => JobKind::Notification,
        }
    }

    /// Returns the task this payload concerns, if any.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::TaskCreated { task_id, .. }
            | Self::TaskStatusChanged { task_id, .. }
            | Self::TaskDeleted { task_id }
            | Self::Notification { task_id, .. } => Some(*task_id),
            Self::OverdueSweep => None,
        }
    }
}

/// Discriminant of a [`JobPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// See [`JobPayload::TaskCreated`].
    TaskCreated,
    /// See [`JobPayload::TaskStatusChanged`].
    TaskStatusChanged,
    /// See [`JobPayload::TaskDeleted`].
    TaskDeleted,
    /// See [`JobPayload::OverdueSweep`].
    OverdueSweep,
    /// See [`JobPayload::Notification`].
    Notification,
}

impl JobKind {
    /// Returns the stable name used in logs and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "task-created",
            Self::TaskStatusChanged => "task-status-changed",
            Self::TaskDeleted => "task-deleted",
            Self::OverdueSweep => "overdue-sweep",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Eligible for delivery once its availability time has passed.
    Waiting,
    /// Reserved by a consumer.
    Active,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully; retained for inspection.
    Failed,
}

impl JobState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for JobState {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(other.to_owned()),
        }
    }
}

/// Persisted job data used to reconstruct a [`Job`].
#[derive(Debug, Clone)]
pub struct PersistedJobData {
    /// Job identifier.
    pub id: JobId,
    /// Work item.
    pub payload: JobPayload,
    /// Delivery options.
    pub options: JobOptions,
    /// Delivery state.
    pub state: JobState,
    /// Number of failed attempts so far.
    pub attempts_made: u32,
    /// Earliest delivery time.
    pub available_at: DateTime<Utc>,
    /// Reason recorded by the latest failure.
    pub last_error: Option<String>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
}

/// Failure reason recorded when a reserved job's lease runs out.
pub const LAPSED_LEASE: &str = "lease expired before the job settled";

/// A unit of deferred work with retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    payload: JobPayload,
    options: JobOptions,
    state: JobState,
    attempts_made: u32,
    available_at: DateTime<Utc>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl Job {
    /// Creates a waiting job available immediately.
    #[must_use]
    pub fn new(payload: JobPayload, options: JobOptions, clock: &impl Clock) -> Self {
        let now = clock.utc();
        Self {
            id: JobId::new(),
            payload,
            options,
            state: JobState::Waiting,
            attempts_made: 0,
            available_at: now,
            last_error: None,
            created_at: now,
        }
    }

    /// Reconstructs a job from storage.
    #[must_use]
    pub fn from_persisted(data: PersistedJobData) -> Self {
        Self {
            id: data.id,
            payload: data.payload,
            options: data.options,
            state: data.state,
            attempts_made: data.attempts_made,
            available_at: data.available_at,
            last_error: data.last_error,
            created_at: data.created_at,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Returns the work item.
    #[must_use]
    pub const fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Returns the delivery options.
    #[must_use]
    pub const fn options(&self) -> JobOptions {
        self.options
    }

    /// Returns the delivery state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Returns the number of failed attempts so far.
    #[must_use]
    pub const fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Returns the earliest delivery time.
    #[must_use]
    pub const fn available_at(&self) -> DateTime<Utc> {
        self.available_at
    }

    /// Returns the reason recorded by the latest failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the enqueue timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns whether the retry ceiling has been reached.
    #[must_use]
    pub const fn attempts_exhausted(&self) -> bool {
        self.attempts_made >= self.options.max_attempts()
    }

    /// Returns whether the job may be reserved at `now`.
    #[must_use]
    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Waiting && self.available_at <= now
    }

    pub(crate) const fn activate(&mut self) {
        self.state = JobState::Active;
    }

    /// Counts an attempt whose lease lapsed before it settled.
    ///
    /// The job stays deliverable so a consumer can report it; once the
    /// ceiling is reached the processor fails it instead of running it.
    pub(crate) fn record_lapsed_lease(&mut self) {
        self.attempts_made = self.attempts_made.saturating_add(1);
        self.last_error = Some(LAPSED_LEASE.to_owned());
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = JobState::Failed;
        self.last_error = Some(reason.into());
    }

    /// Counts a failed attempt and either schedules a retry or fails the job.
    pub(crate) fn record_failure(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> JobState {
        self.attempts_made = self.attempts_made.saturating_add(1);
        self.last_error = Some(reason.into());
        if self.attempts_exhausted() {
            self.state = JobState::Failed;
        } else {
            let delay = self.options.backoff().delay_after(self.attempts_made);
            let wait = chrono::TimeDelta::from_std(delay).unwrap_or(chrono::TimeDelta::MAX);
            self.available_at = now.checked_add_signed(wait).unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.state = JobState::Waiting;
        }
        self.state
    }
}
