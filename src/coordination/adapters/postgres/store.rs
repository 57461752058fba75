//! `PostgreSQL` implementation of [`KeyValueStore`].

use super::models::{CounterRow, FlagRow, ValueRow};
use crate::coordination::ports::{KeyValueStore, KeyValueStoreError, KeyValueStoreResult};
use crate::postgres::{PgPool, duration_millis, get_conn_with, run_blocking_with};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_types::{BigInt, Nullable, Text};
use std::time::Duration;

const LIVE: &str = "(kv_entries.expires_at IS NULL OR kv_entries.expires_at > now())";

/// `PostgreSQL`-backed key-value store.
#[derive(Debug, Clone)]
pub struct PostgresKeyValueStore {
    pool: PgPool,
}

impl PostgresKeyValueStore {
    /// Creates a store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> KeyValueStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> KeyValueStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        run_blocking_with(
            move || {
                let mut connection = get_conn_with(&pool, KeyValueStoreError::backend)?;
                f(&mut connection)
            },
            KeyValueStoreError::backend,
        )
        .await
    }
}

#[async_trait]
impl KeyValueStore for PostgresKeyValueStore {
    async fn get(&self, key: &str) -> KeyValueStoreResult<Option<String>> {
        let key = key.to_owned();
        self.run_blocking(move |connection| {
            let query = format!("SELECT value FROM kv_entries WHERE key = $1 AND {LIVE}");
            let row = diesel::sql_query(query)
                .bind::<Text, _>(&key)
                .get_result::<ValueRow>(connection)
                .optional()
                .map_err(KeyValueStoreError::backend)?;
            Ok(row.map(|found| found.value))
        })
        .await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> KeyValueStoreResult<()> {
        let key = key.to_owned();
        let value = value.to_owned();
        let ttl_ms = ttl.map(duration_millis);
        self.run_blocking(move |connection| {
            diesel::sql_query(concat!(
                "INSERT INTO kv_entries (key, value, expires_at) ",
                "VALUES ($1, $2, now() + $3::DOUBLE PRECISION * INTERVAL '1 millisecond') ",
                "ON CONFLICT (key) DO UPDATE ",
                "SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
            ))
            .bind::<Text, _>(&key)
            .bind::<Text, _>(&value)
            .bind::<Nullable<BigInt>, _>(ttl_ms)
            .execute(connection)
            .map_err(KeyValueStoreError::backend)?;
            Ok(())
        })
        .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> KeyValueStoreResult<bool> {
        let key = key.to_owned();
        let value = value.to_owned();
        let ttl_ms = duration_millis(ttl);
        self.run_blocking(move |connection| {
            // A row left behind by an expired holder is taken over in place;
            // a live row makes the upsert affect zero rows.
            let affected = diesel::sql_query(concat!(
                "INSERT INTO kv_entries (key, value, expires_at) ",
                "VALUES ($1, $2, now() + $3::DOUBLE PRECISION * INTERVAL '1 millisecond') ",
                "ON CONFLICT (key) DO UPDATE ",
                "SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at ",
                "WHERE kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= now()",
            ))
            .bind::<Text, _>(&key)
            .bind::<Text, _>(&value)
            .bind::<BigInt, _>(ttl_ms)
            .execute(connection)
            .map_err(KeyValueStoreError::backend)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn delete(&self, key: &str) -> KeyValueStoreResult<bool> {
        let key = key.to_owned();
        self.run_blocking(move |connection| {
            let query = format!("DELETE FROM kv_entries WHERE key = $1 RETURNING {LIVE} AS flag");
            let removed = diesel::sql_query(query)
                .bind::<Text, _>(&key)
                .get_result::<FlagRow>(connection)
                .optional()
                .map_err(KeyValueStoreError::backend)?;
            Ok(removed.is_some_and(|row| row.flag))
        })
        .await
    }

    async fn exists(&self, key: &str) -> KeyValueStoreResult<bool> {
        let key = key.to_owned();
        self.run_blocking(move |connection| {
            let query = format!(
                "SELECT EXISTS (SELECT 1 FROM kv_entries WHERE key = $1 AND {LIVE}) AS flag"
            );
            let row = diesel::sql_query(query)
                .bind::<Text, _>(&key)
                .get_result::<FlagRow>(connection)
                .map_err(KeyValueStoreError::backend)?;
            Ok(row.flag)
        })
        .await
    }

    async fn increment(&self, key: &str) -> KeyValueStoreResult<i64> {
        let key = key.to_owned();
        self.run_blocking(move |connection| {
            let query = format!(
                concat!(
                    "INSERT INTO kv_entries (key, value, expires_at) VALUES ($1, '1', NULL) ",
                    "ON CONFLICT (key) DO UPDATE SET ",
                    "value = CASE WHEN {live} ",
                    "THEN (kv_entries.value::BIGINT + 1)::TEXT ELSE '1' END, ",
                    "expires_at = CASE WHEN {live} THEN kv_entries.expires_at ELSE NULL END ",
                    "RETURNING value::BIGINT AS counter",
                ),
                live = LIVE
            );
            let row = diesel::sql_query(query)
                .bind::<Text, _>(&key)
                .get_result::<CounterRow>(connection)
                .map_err(|err| map_increment_error(err, &key))?;
            Ok(row.counter)
        })
        .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> KeyValueStoreResult<bool> {
        let key = key.to_owned();
        let expected = expected.to_owned();
        self.run_blocking(move |connection| {
            let query =
                format!("DELETE FROM kv_entries WHERE key = $1 AND value = $2 AND {LIVE}");
            let affected = diesel::sql_query(query)
                .bind::<Text, _>(&key)
                .bind::<Text, _>(&expected)
                .execute(connection)
                .map_err(KeyValueStoreError::backend)?;
            Ok(affected == 1)
        })
        .await
    }

    async fn flush_all(&self) -> KeyValueStoreResult<()> {
        self.run_blocking(|connection| {
            diesel::sql_query("DELETE FROM kv_entries")
                .execute(connection)
                .map_err(KeyValueStoreError::backend)?;
            Ok(())
        })
        .await
    }
}

fn map_increment_error(err: DieselError, key: &str) -> KeyValueStoreError {
    match err {
        DieselError::DatabaseError(_, ref info)
            if info.message().contains("invalid input syntax") =>
        {
            KeyValueStoreError::NotAnInteger(key.to_owned())
        }
        _ => KeyValueStoreError::backend(err),
    }
}
