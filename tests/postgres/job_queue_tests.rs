//! Reservation, retry, retention and lease reclaim over `PostgreSQL`.

use crate::postgres::helpers::{
    PostgresCluster, SteppedClock, TestDatabase, open_database, postgres_cluster,
};
use chrono::TimeDelta;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use taskflow::queue::{
    adapters::postgres::PostgresJobQueue,
    domain::{
        BackoffPolicy, JobOptions, JobOutcome, JobPayload, JobReport, JobState, LAPSED_LEASE,
    },
    ports::{JobQueue, JobQueueError},
};
use taskflow::task::domain::{TaskId, TaskStatus};

const LEASE: Duration = Duration::from_secs(30);

struct QueueContext {
    queue: PostgresJobQueue<SteppedClock>,
    clock: SteppedClock,
    db: TestDatabase,
}

impl QueueContext {
    fn open(cluster: Option<PostgresCluster>) -> eyre::Result<Option<Self>> {
        let Some(db) = open_database(cluster)? else {
            return Ok(None);
        };
        let clock = SteppedClock::default();
        let queue = PostgresJobQueue::with_clock(db.pool.clone(), Arc::new(clock.clone()))
            .with_lease(LEASE);
        Ok(Some(Self { queue, clock, db }))
    }

    fn tick(&self, seconds: i64) {
        self.clock.advance(TimeDelta::seconds(seconds));
    }
}

fn created(task_id: TaskId) -> JobPayload {
    JobPayload::TaskCreated {
        task_id,
        status: TaskStatus::Pending,
    }
}

fn options(max_attempts: u32) -> JobOptions {
    JobOptions::new(
        max_attempts,
        BackoffPolicy::exponential(Duration::from_secs(10)),
    )
}

#[rstest]
fn ready_jobs_are_reserved_once_in_arrival_order(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(ctx) = QueueContext::open(postgres_cluster)? else {
        return Ok(());
    };

    ctx.db.rt.block_on(async {
        let first = ctx.queue.enqueue(created(TaskId::new()), options(3)).await?;
        ctx.tick(1);
        let second = ctx.queue.enqueue(JobPayload::OverdueSweep, options(3)).await?;
        ctx.tick(1);

        let reserved = ctx.queue.reserve().await?.map(|job| job.id());
        eyre::ensure!(reserved == Some(first), "expected {first}, got {reserved:?}");
        let next = ctx.queue.reserve().await?;
        eyre::ensure!(
            next.as_ref().map(|job| (job.id(), job.state())) == Some((second, JobState::Active))
        );
        eyre::ensure!(
            ctx.queue.reserve().await?.is_none(),
            "active jobs inside their lease are not handed out again"
        );
        Ok(())
    })
}

#[rstest]
fn failures_back_off_then_exhaust_into_the_failed_set(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(ctx) = QueueContext::open(postgres_cluster)? else {
        return Ok(());
    };

    ctx.db.rt.block_on(async {
        let id = ctx.queue.enqueue(created(TaskId::new()), options(2)).await?;
        eyre::ensure!(ctx.queue.reserve().await?.is_some());

        let state = ctx.queue.fail(id, "notifier unavailable").await?;
        eyre::ensure!(state == JobState::Waiting, "first failure should retry, got {state:?}");
        eyre::ensure!(
            ctx.queue.reserve().await?.is_none(),
            "retry must wait out its backoff"
        );

        ctx.tick(10);
        let retried = ctx
            .queue
            .reserve()
            .await?
            .ok_or_else(|| eyre::eyre!("retry was not delivered after the backoff"))?;
        eyre::ensure!(retried.id() == id);
        eyre::ensure!(retried.attempts_made() == 1);

        let exhausted = ctx.queue.fail(id, "notifier unavailable").await?;
        eyre::ensure!(exhausted == JobState::Failed);
        let failed = ctx.queue.failed_jobs().await?;
        eyre::ensure!(failed.len() == 1);
        let job = failed
            .first()
            .ok_or_else(|| eyre::eyre!("failed job missing"))?;
        eyre::ensure!(job.id() == id);
        eyre::ensure!(job.attempts_made() == 2);
        eyre::ensure!(job.last_error() == Some("notifier unavailable"));
        Ok(())
    })
}

#[rstest]
fn successes_are_deleted_and_reported_failures_are_retained(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(ctx) = QueueContext::open(postgres_cluster)? else {
        return Ok(());
    };
    let task_id = TaskId::new();

    ctx.db.rt.block_on(async {
        let done = ctx.queue.enqueue(JobPayload::TaskDeleted { task_id }, options(3)).await?;
        ctx.tick(1);
        let refused = ctx.queue.enqueue(created(task_id), options(3)).await?;
        ctx.queue.reserve().await?;
        ctx.queue.reserve().await?;

        ctx.queue
            .complete(done, &JobOutcome::Succeeded(JobReport::TaskDeleted { task_id }))
            .await?;
        ctx.queue
            .complete(refused, &JobOutcome::failed("task no longer exists"))
            .await?;

        eyre::ensure!(ctx.queue.find(done).await?.is_none(), "successful jobs are removed");
        let kept = ctx
            .queue
            .find(refused)
            .await?
            .ok_or_else(|| eyre::eyre!("reported failure should be retained"))?;
        eyre::ensure!(kept.state() == JobState::Failed);
        eyre::ensure!(kept.last_error() == Some("task no longer exists"));
        let failed: Vec<_> = ctx
            .queue
            .failed_jobs()
            .await?
            .iter()
            .map(|job| job.id())
            .collect();
        eyre::ensure!(failed == vec![refused]);

        let again = ctx
            .queue
            .complete(refused, &JobOutcome::failed("twice"))
            .await;
        eyre::ensure!(
            matches!(again, Err(JobQueueError::NotActive(id)) if id == refused),
            "settled jobs cannot be completed again: {again:?}"
        );
        Ok(())
    })
}

#[rstest]
fn lapsed_leases_are_reclaimed_and_count_an_attempt(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(ctx) = QueueContext::open(postgres_cluster)? else {
        return Ok(());
    };

    ctx.db.rt.block_on(async {
        let id = ctx.queue.enqueue(created(TaskId::new()), options(2)).await?;
        let first = ctx
            .queue
            .reserve()
            .await?
            .ok_or_else(|| eyre::eyre!("job not delivered"))?;
        eyre::ensure!(first.attempts_made() == 0);

        ctx.tick(31);
        let reclaimed = ctx
            .queue
            .reserve()
            .await?
            .ok_or_else(|| eyre::eyre!("lapsed lease was not reclaimed"))?;
        eyre::ensure!(reclaimed.id() == id);
        eyre::ensure!(reclaimed.attempts_made() == 1);
        eyre::ensure!(reclaimed.last_error() == Some(LAPSED_LEASE));
        eyre::ensure!(!reclaimed.attempts_exhausted());
        let stored = ctx
            .queue
            .find(id)
            .await?
            .ok_or_else(|| eyre::eyre!("job missing"))?;
        eyre::ensure!(stored.attempts_made() == 1, "the lapse must be persisted");

        ctx.tick(31);
        let last = ctx
            .queue
            .reserve()
            .await?
            .ok_or_else(|| eyre::eyre!("second lapse was not reclaimed"))?;
        eyre::ensure!(last.attempts_made() == 2);
        eyre::ensure!(last.attempts_exhausted());
        Ok(())
    })
}
