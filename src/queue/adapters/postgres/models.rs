//! Diesel row models for job persistence.

use super::schema::jobs;
use crate::queue::domain::{
    BackoffPolicy, Job, JobId, JobOptions, JobPayload, JobState, PersistedJobData,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::time::Duration;
use uuid::Uuid;

/// Query result row for jobs.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(super) struct JobRow {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub state: String,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub available_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    /// Reconstructs the domain job, describing why when the row is unusable.
    pub fn into_job(self) -> Result<Job, String> {
        let payload = serde_json::from_value::<JobPayload>(self.payload)
            .map_err(|err| format!("unrecognised {} payload: {err}", self.kind))?;
        let state = JobState::try_from(self.state.as_str())
            .map_err(|raw| format!("unknown job state: {raw}"))?;
        let attempts_made = u32::try_from(self.attempts_made)
            .map_err(|_| format!("negative attempt count: {}", self.attempts_made))?;
        let max_attempts = u32::try_from(self.max_attempts)
            .map_err(|_| format!("negative attempt ceiling: {}", self.max_attempts))?;
        let base_ms = u64::try_from(self.backoff_base_ms).unwrap_or_default();
        let options = JobOptions::new(
            max_attempts,
            BackoffPolicy::exponential(Duration::from_millis(base_ms)),
        );
        Ok(Job::from_persisted(PersistedJobData {
            id: JobId::from_uuid(self.id),
            payload,
            options,
            state,
            attempts_made,
            available_at: self.available_at,
            last_error: self.last_error,
            created_at: self.created_at,
        }))
    }
}

/// Insert model for new jobs.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = jobs)]
pub(super) struct NewJobRow {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub state: String,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Changeset applied after a failed attempt.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = jobs)]
#[diesel(treat_none_as_null = true)]
pub(super) struct FailureChangeset {
    pub state: String,
    pub attempts_made: i32,
    pub available_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}
