//! `PostgreSQL` implementation of [`JobQueue`].

use super::{
    models::{FailureChangeset, JobRow, NewJobRow},
    schema::jobs,
};
use crate::postgres::{PgPool, duration_millis, get_conn_with, run_blocking_with};
use crate::queue::{
    domain::{Job, JobId, JobOptions, JobOutcome, JobPayload, JobState},
    ports::{JobQueue, JobQueueError, JobQueueResult},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use mockable::{Clock, DefaultClock};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default time an active job stays reserved before redelivery.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
#[error("{0}")]
struct UndecodableJob(String);

#[derive(Debug, Error)]
#[error("{0}")]
struct OutOfRange(String);

impl From<DieselError> for JobQueueError {
    fn from(err: DieselError) -> Self {
        Self::backend(err)
    }
}

/// `PostgreSQL`-backed durable job queue.
pub struct PostgresJobQueue<C = DefaultClock>
where
    C: Clock + Send + Sync,
{
    pool: PgPool,
    clock: Arc<C>,
    lease: Duration,
}

impl<C> Clone for PostgresJobQueue<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            clock: Arc::clone(&self.clock),
            lease: self.lease,
        }
    }
}

impl PostgresJobQueue<DefaultClock> {
    /// Creates a queue from a `PostgreSQL` connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(DefaultClock))
    }
}

impl<C> PostgresJobQueue<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a queue using the given clock for scheduling decisions.
    #[must_use]
    pub const fn with_clock(pool: PgPool, clock: Arc<C>) -> Self {
        Self {
            pool,
            clock,
            lease: DEFAULT_LEASE,
        }
    }

    /// Overrides how long a reserved job is held before redelivery.
    #[must_use]
    pub const fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    async fn run_blocking<F, T>(&self, f: F) -> JobQueueResult<T>
    where
        F: FnOnce(&mut PgConnection) -> JobQueueResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        run_blocking_with(
            move || {
                let mut connection = get_conn_with(&pool, JobQueueError::backend)?;
                f(&mut connection)
            },
            JobQueueError::backend,
        )
        .await
    }
}

fn to_i32(value: u32) -> JobQueueResult<i32> {
    i32::try_from(value)
        .map_err(|_| JobQueueError::backend(OutOfRange(format!("{value} exceeds INT range"))))
}

fn offset(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let wait = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
    now.checked_add_signed(wait).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn new_row(job: &Job) -> JobQueueResult<NewJobRow> {
    let payload = serde_json::to_value(job.payload()).map_err(JobQueueError::backend)?;
    let options = job.options();
    Ok(NewJobRow {
        id: job.id().into_inner(),
        kind: job.payload().kind().as_str().to_owned(),
        payload,
        state: job.state().as_str().to_owned(),
        attempts_made: to_i32(job.attempts_made())?,
        max_attempts: to_i32(options.max_attempts())?,
        backoff_base_ms: duration_millis(options.backoff().base_delay()),
        available_at: job.available_at(),
        created_at: job.created_at(),
        updated_at: job.created_at(),
    })
}

fn mark_failed(
    connection: &mut PgConnection,
    id: uuid::Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<usize, DieselError> {
    diesel::update(jobs::table.filter(jobs::id.eq(id)))
        .set((
            jobs::state.eq(JobState::Failed.as_str()),
            jobs::lease_expires_at.eq(None::<DateTime<Utc>>),
            jobs::last_error.eq(Some(reason)),
            jobs::updated_at.eq(now),
        ))
        .execute(connection)
}

fn lock_active(connection: &mut PgConnection, id: JobId) -> JobQueueResult<JobRow> {
    jobs::table
        .filter(jobs::id.eq(id.into_inner()))
        .filter(jobs::state.eq(JobState::Active.as_str()))
        .select(JobRow::as_select())
        .for_update()
        .first::<JobRow>(connection)
        .optional()?
        .ok_or(JobQueueError::NotActive(id))
}

#[async_trait]
impl<C> JobQueue for PostgresJobQueue<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn enqueue(&self, payload: JobPayload, options: JobOptions) -> JobQueueResult<JobId> {
        let job = Job::new(payload, options, &*self.clock);
        let row = new_row(&job)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(jobs::table)
                .values(&row)
                .execute(connection)?;
            Ok(job.id())
        })
        .await
    }

    async fn reserve(&self) -> JobQueueResult<Option<Job>> {
        let now = self.clock.utc();
        let lease_until = offset(now, self.lease);
        self.run_blocking(move |connection| {
            connection.transaction::<_, JobQueueError, _>(|tx| {
                loop {
                    let candidate = jobs::table
                        .filter(
                            jobs::state
                                .eq(JobState::Waiting.as_str())
                                .and(jobs::available_at.le(now))
                                .or(jobs::state
                                    .eq(JobState::Active.as_str())
                                    .and(jobs::lease_expires_at.assume_not_null().le(now))),
                        )
                        .order((jobs::available_at.asc(), jobs::created_at.asc()))
                        .select(JobRow::as_select())
                        .for_update()
                        .skip_locked()
                        .first::<JobRow>(tx)
                        .optional()?;
                    let Some(row) = candidate else {
                        return Ok(None);
                    };
                    let id = row.id;
                    let reclaimed = row.state == JobState::Active.as_str();
                    match row.into_job() {
                        Ok(mut job) => {
                            if reclaimed {
                                job.record_lapsed_lease();
                                warn!(
                                    job_id = %id,
                                    attempts = job.attempts_made(),
                                    "reclaiming job whose lease lapsed"
                                );
                            }
                            diesel::update(jobs::table.filter(jobs::id.eq(id)))
                                .set((
                                    jobs::state.eq(JobState::Active.as_str()),
                                    jobs::attempts_made.eq(to_i32(job.attempts_made())?),
                                    jobs::last_error.eq(job.last_error()),
                                    jobs::lease_expires_at.eq(Some(lease_until)),
                                    jobs::updated_at.eq(now),
                                ))
                                .execute(tx)?;
                            job.activate();
                            return Ok(Some(job));
                        }
                        Err(reason) => {
                            warn!(job_id = %id, reason = %reason, "failing undecodable job");
                            mark_failed(tx, id, &reason, now)?;
                        }
                    }
                }
            })
        })
        .await
    }

    async fn complete(&self, id: JobId, outcome: &JobOutcome) -> JobQueueResult<()> {
        let now = self.clock.utc();
        let failure = match outcome {
            JobOutcome::Succeeded(_) => None,
            JobOutcome::Failed { reason } => Some(reason.clone()),
        };
        self.run_blocking(move |connection| {
            let active = jobs::table
                .filter(jobs::id.eq(id.into_inner()))
                .filter(jobs::state.eq(JobState::Active.as_str()));
            let affected = match failure {
                None => diesel::delete(active).execute(connection)?,
                Some(reason) => diesel::update(active)
                    .set((
                        jobs::state.eq(JobState::Failed.as_str()),
                        jobs::lease_expires_at.eq(None::<DateTime<Utc>>),
                        jobs::last_error.eq(Some(reason)),
                        jobs::updated_at.eq(now),
                    ))
                    .execute(connection)?,
            };
            if affected == 0 {
                return Err(JobQueueError::NotActive(id));
            }
            Ok(())
        })
        .await
    }

    async fn fail(&self, id: JobId, error: &str) -> JobQueueResult<JobState> {
        let now = self.clock.utc();
        let error = error.to_owned();
        self.run_blocking(move |connection| {
            connection.transaction::<_, JobQueueError, _>(|tx| {
                let row = lock_active(tx, id)?;
                let mut job = match row.into_job() {
                    Ok(job) => job,
                    Err(reason) => {
                        mark_failed(tx, id.into_inner(), &reason, now)?;
                        return Ok(JobState::Failed);
                    }
                };
                let state = job.record_failure(error.as_str(), now);
                let changes = FailureChangeset {
                    state: state.as_str().to_owned(),
                    attempts_made: to_i32(job.attempts_made())?,
                    available_at: job.available_at(),
                    lease_expires_at: None,
                    last_error: job.last_error().map(str::to_owned),
                    updated_at: now,
                };
                diesel::update(jobs::table.filter(jobs::id.eq(id.into_inner())))
                    .set(&changes)
                    .execute(tx)?;
                Ok(state)
            })
        })
        .await
    }

    async fn find(&self, id: JobId) -> JobQueueResult<Option<Job>> {
        self.run_blocking(move |connection| {
            let row = jobs::table
                .filter(jobs::id.eq(id.into_inner()))
                .select(JobRow::as_select())
                .first::<JobRow>(connection)
                .optional()?;
            row.map(|found| {
                found
                    .into_job()
                    .map_err(|reason| JobQueueError::backend(UndecodableJob(reason)))
            })
            .transpose()
        })
        .await
    }

    async fn failed_jobs(&self) -> JobQueueResult<Vec<Job>> {
        self.run_blocking(move |connection| {
            let rows = jobs::table
                .filter(jobs::state.eq(JobState::Failed.as_str()))
                .order(jobs::updated_at.asc())
                .select(JobRow::as_select())
                .load::<JobRow>(connection)?;
            Ok(rows
                .into_iter()
                .filter_map(|row| {
                    let id = row.id;
                    row.into_job()
                        .inspect_err(|reason| {
                            warn!(job_id = %id, reason = %reason, "skipping undecodable job");
                        })
                        .ok()
                })
                .collect())
        })
        .await
    }
}
