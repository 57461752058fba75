//! Shared setup for the `PostgreSQL` adapter tests.

pub use super::cluster::{BoxError, PostgresCluster, postgres_cluster};
use super::cluster::TemporaryDatabase;
use chrono::{DateTime, Local, TimeDelta, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use taskflow::postgres::PgPool;
use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

const CREATE_TASKS_SQL: &str =
    include_str!("../../migrations/2025-01-01-000001_create_tasks/up.sql");
const CREATE_KV_ENTRIES_SQL: &str =
    include_str!("../../migrations/2025-01-01-000002_create_kv_entries/up.sql");
const CREATE_JOBS_SQL: &str =
    include_str!("../../migrations/2025-01-01-000003_create_jobs/up.sql");

/// Database holding the migrated schema that test databases are cloned from.
pub const TEMPLATE_DB: &str = "taskflow_test_template";

/// Builds the runtime tests drive the async adapters with.
pub fn test_runtime() -> Result<Runtime, BoxError> {
    Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|err| Box::new(err) as BoxError)
}

fn apply_migrations(url: &str) -> Result<(), BoxError> {
    let mut conn = PgConnection::establish(url).map_err(|err| Box::new(err) as BoxError)?;
    for sql in [CREATE_TASKS_SQL, CREATE_KV_ENTRIES_SQL, CREATE_JOBS_SQL] {
        conn.batch_execute(sql)
            .map_err(|err| Box::new(err) as BoxError)?;
    }
    Ok(())
}

/// A migrated database private to one test, plus the runtime to drive it.
pub struct TestDatabase {
    pub rt: Runtime,
    pub pool: PgPool,
    _database: TemporaryDatabase,
}

/// Clones a fresh database from the template.
///
/// Returns `Ok(None)` when no cluster is available so the caller can skip.
pub fn open_database(cluster: Option<PostgresCluster>) -> eyre::Result<Option<TestDatabase>> {
    let Some(cluster) = cluster else {
        return Ok(None);
    };
    cluster
        .ensure_template_exists(TEMPLATE_DB, apply_migrations)
        .map_err(|err| eyre::eyre!(err))?;
    let database = cluster
        .temporary_database_from_template(&format!("taskflow_{}", Uuid::new_v4()), TEMPLATE_DB)
        .map_err(|err| eyre::eyre!(err))?;
    let pool = Pool::builder()
        .max_size(2)
        .build(ConnectionManager::<PgConnection>::new(database.url()))?;
    let rt = test_runtime().map_err(|err| eyre::eyre!(err))?;
    Ok(Some(TestDatabase {
        rt,
        pool,
        _database: database,
    }))
}

/// Clock the queue tests move by hand.
#[derive(Debug, Clone)]
pub struct SteppedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for SteppedClock {
    fn default() -> Self {
        Self {
            now: Arc::new(Mutex::new(Utc::now())),
        }
    }
}

impl SteppedClock {
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }
}

impl Clock for SteppedClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
