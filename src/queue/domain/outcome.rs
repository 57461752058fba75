//! Results reported by job handlers.

use super::JobId;
use crate::task::domain::{TaskId, TaskStatus};
use thiserror::Error;

/// Result of handling a job that did not raise.
///
/// A reported failure finishes the job without retry; only a
/// [`JobHandlerError`] consumes a retry attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job did its work.
    Succeeded(JobReport),
    /// The job was handled but could not do its work.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

impl JobOutcome {
    /// Builds a reported failure.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Returns whether the outcome is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Detail attached to a successful outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    /// A creation event was observed.
    TaskCreated {
        /// Created task.
        task_id: TaskId,
        /// Status observed at creation.
        status: TaskStatus,
    },
    /// A task's status was set.
    StatusUpdated {
        /// Updated task.
        task_id: TaskId,
        /// Status now stored.
        new_status: TaskStatus,
    },
    /// A deletion event was acknowledged.
    TaskDeleted {
        /// Deleted task.
        task_id: TaskId,
    },
    /// An overdue sweep finished.
    Sweep(SweepReport),
    /// A notification was delivered.
    NotificationSent {
        /// Task the notification concerned.
        task_id: TaskId,
    },
}

/// Summary of one overdue sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of result pages fetched.
    pub pages: u32,
    /// One entry per overdue task found.
    pub results: Vec<SweepItemResult>,
}

impl SweepReport {
    /// Returns the number of overdue tasks examined.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    /// Returns the number of notifications successfully scheduled.
    #[must_use]
    pub fn scheduled(&self) -> usize {
        self.results
            .iter()
            .filter(|item| matches!(item.result, NotificationResult::Scheduled(_)))
            .count()
    }
}

/// Notification scheduling result for one overdue task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepItemResult {
    /// Overdue task.
    pub task_id: TaskId,
    /// Whether its notification was scheduled.
    pub result: NotificationResult,
}

/// Whether a notification job was enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    /// The notification job was enqueued.
    Scheduled(JobId),
    /// Enqueueing failed with the given reason.
    Failed(String),
}

/// Error raised by a job handler; the queue retries it with backoff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job {job_id} failed: {message}")]
pub struct JobHandlerError {
    /// Job that raised.
    pub job_id: JobId,
    /// Description of the underlying failure.
    pub message: String,
}

impl JobHandlerError {
    /// Wraps an underlying failure for the given job.
    #[must_use]
    pub fn new(job_id: JobId, cause: impl std::fmt::Display) -> Self {
        Self {
            job_id,
            message: cause.to_string(),
        }
    }
}
