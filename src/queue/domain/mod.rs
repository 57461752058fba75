//! Domain model for queued jobs.

mod job;
mod outcome;
mod retry;

pub use job::{Job, JobId, JobKind, JobPayload, JobState, LAPSED_LEASE, PersistedJobData};
pub use outcome::{
    JobHandlerError, JobOutcome, JobReport, NotificationResult, SweepItemResult, SweepReport,
};
pub use retry::{BackoffPolicy, JobOptions};
