//! Key-value store semantics and the lock protocol over `PostgreSQL`.

use crate::postgres::helpers::{PostgresCluster, open_database, postgres_cluster};
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use taskflow::coordination::{
    LockError, LockManager,
    adapters::postgres::PostgresKeyValueStore,
    ports::{KeyValueStore, KeyValueStoreError},
};

const SHORT_TTL: Duration = Duration::from_millis(200);
const PAST_SHORT_TTL: Duration = Duration::from_millis(500);
const LONG_TTL: Duration = Duration::from_secs(30);

type PgLocks = LockManager<PostgresKeyValueStore, DefaultClock>;

fn locks(store: &Arc<PostgresKeyValueStore>) -> PgLocks {
    LockManager::new(Arc::clone(store), Arc::new(DefaultClock))
}

#[rstest]
fn set_if_absent_refuses_a_live_key_and_takes_over_an_expired_one(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(db) = open_database(postgres_cluster)? else {
        return Ok(());
    };
    let store = PostgresKeyValueStore::new(db.pool.clone());

    db.rt.block_on(async {
        eyre::ensure!(store.set_if_absent("slot", "first", SHORT_TTL).await?);
        eyre::ensure!(!store.set_if_absent("slot", "second", SHORT_TTL).await?);
        eyre::ensure!(store.get("slot").await?.as_deref() == Some("first"));
        Ok(())
    })?;

    sleep(PAST_SHORT_TTL);

    db.rt.block_on(async {
        eyre::ensure!(!store.exists("slot").await?, "expired entry must read as absent");
        eyre::ensure!(store.set_if_absent("slot", "third", LONG_TTL).await?);
        eyre::ensure!(store.get("slot").await?.as_deref() == Some("third"));
        Ok(())
    })
}

#[rstest]
fn set_without_ttl_never_expires_and_replaces_values(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(db) = open_database(postgres_cluster)? else {
        return Ok(());
    };
    let store = PostgresKeyValueStore::new(db.pool.clone());

    db.rt.block_on(async {
        store.set("config", "a", None).await?;
        store.set("config", "b", None).await?;
        eyre::ensure!(store.get("config").await?.as_deref() == Some("b"));
        eyre::ensure!(!store.set_if_absent("config", "c", SHORT_TTL).await?);
        eyre::ensure!(store.delete("config").await?);
        eyre::ensure!(!store.delete("config").await?, "second delete finds nothing");
        Ok(())
    })
}

#[rstest]
fn compare_and_delete_only_removes_a_matching_value(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(db) = open_database(postgres_cluster)? else {
        return Ok(());
    };
    let store = PostgresKeyValueStore::new(db.pool.clone());

    db.rt.block_on(async {
        store.set("lock:task:1", "owner-a", Some(LONG_TTL)).await?;

        eyre::ensure!(!store.compare_and_delete("lock:task:1", "owner-b").await?);
        eyre::ensure!(store.get("lock:task:1").await?.as_deref() == Some("owner-a"));

        eyre::ensure!(store.compare_and_delete("lock:task:1", "owner-a").await?);
        eyre::ensure!(!store.exists("lock:task:1").await?);
        Ok(())
    })
}

#[rstest]
fn increment_counts_from_zero_and_rejects_text(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(db) = open_database(postgres_cluster)? else {
        return Ok(());
    };
    let store = PostgresKeyValueStore::new(db.pool.clone());

    db.rt.block_on(async {
        eyre::ensure!(store.increment("hits").await? == 1);
        eyre::ensure!(store.increment("hits").await? == 2);

        store.set("name", "alice", None).await?;
        let result = store.increment("name").await;
        eyre::ensure!(
            matches!(result, Err(KeyValueStoreError::NotAnInteger(ref key)) if key == "name"),
            "unexpected increment result: {result:?}"
        );

        store.flush_all().await?;
        eyre::ensure!(!store.exists("hits").await?);
        Ok(())
    })
}

#[rstest]
fn second_process_sees_a_held_lock(postgres_cluster: Option<PostgresCluster>) -> eyre::Result<()> {
    let Some(db) = open_database(postgres_cluster)? else {
        return Ok(());
    };
    let store = Arc::new(PostgresKeyValueStore::new(db.pool.clone()));
    let first = locks(&store);
    let second = locks(&store);

    db.rt.block_on(async {
        let token = first.acquire("lock:task:7", LONG_TTL).await?;
        let contended = second.acquire("lock:task:7", LONG_TTL).await;
        eyre::ensure!(
            matches!(contended, Err(LockError::Held { ref key }) if key == "lock:task:7"),
            "unexpected acquire result: {contended:?}"
        );

        eyre::ensure!(first.release("lock:task:7", &token).await?);
        second.acquire("lock:task:7", LONG_TTL).await?;
        Ok(())
    })
}

#[rstest]
fn lapsed_holder_cannot_release_the_next_holders_lock(
    postgres_cluster: Option<PostgresCluster>,
) -> eyre::Result<()> {
    let Some(db) = open_database(postgres_cluster)? else {
        return Ok(());
    };
    let store = Arc::new(PostgresKeyValueStore::new(db.pool.clone()));
    let stale = locks(&store);
    let current = locks(&store);

    let stale_token = db
        .rt
        .block_on(stale.acquire("lock:task:9", SHORT_TTL))?;
    sleep(PAST_SHORT_TTL);

    db.rt.block_on(async {
        let current_token = current.acquire("lock:task:9", LONG_TTL).await?;

        let released = stale.release("lock:task:9", &stale_token).await?;
        eyre::ensure!(!released, "stale token must not release the new lock");
        eyre::ensure!(
            store.get("lock:task:9").await?.as_deref() == Some(current_token.as_str()),
            "the newer holder's entry must survive"
        );
        Ok(())
    })
}

#[rstest]
fn dropped_guard_releases_the_key(postgres_cluster: Option<PostgresCluster>) -> eyre::Result<()> {
    let Some(db) = open_database(postgres_cluster)? else {
        return Ok(());
    };
    let store = Arc::new(PostgresKeyValueStore::new(db.pool.clone()));
    let manager = Arc::new(locks(&store));

    db.rt.block_on(async {
        let guard = manager.lock("lock:task:11", LONG_TTL).await?;
        eyre::ensure!(store.exists("lock:task:11").await?);
        drop(guard);

        for _ in 0..100 {
            if !store.exists("lock:task:11").await? {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        eyre::bail!("dropped guard never released lock:task:11")
    })
}
