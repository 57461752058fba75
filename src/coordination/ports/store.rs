//! Shared key-value store port used by locks and caches.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for key-value store operations.
pub type KeyValueStoreResult<T> = Result<T, KeyValueStoreError>;

/// Key-value store with per-entry expiry.
///
/// Implementations must treat expired entries as absent for every
/// operation, including [`KeyValueStore::set_if_absent`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> KeyValueStoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// When `ttl` is `None` the entry never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
    -> KeyValueStoreResult<()>;

    /// Stores `value` under `key` only when no live entry exists.
    ///
    /// Returns `true` when the value was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> KeyValueStoreResult<bool>;

    /// Removes the entry under `key`. Returns `true` when an entry existed.
    async fn delete(&self, key: &str) -> KeyValueStoreResult<bool>;

    /// Returns whether a live entry exists under `key`.
    async fn exists(&self, key: &str) -> KeyValueStoreResult<bool>;

    /// Atomically increments the integer stored under `key`.
    ///
    /// Missing entries start from zero. Any existing expiry is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueStoreError::NotAnInteger`] when the stored value
    /// does not parse as an integer.
    async fn increment(&self, key: &str) -> KeyValueStoreResult<i64>;

    /// Deletes the entry under `key` only when its value equals `expected`.
    ///
    /// The comparison and deletion happen as one atomic step. Returns `true`
    /// when the entry was removed.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> KeyValueStoreResult<bool>;

    /// Removes every entry in the store.
    async fn flush_all(&self) -> KeyValueStoreResult<()>;
}

/// Errors returned by key-value store adapters.
#[derive(Debug, Clone, Error)]
pub enum KeyValueStoreError {
    /// The stored value cannot be incremented.
    #[error("value stored under '{0}' is not an integer")]
    NotAnInteger(String),

    /// Backend failure.
    #[error("key-value store error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl KeyValueStoreError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}

/// Computes the absolute deadline for a TTL, or `None` if it overflows.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}
