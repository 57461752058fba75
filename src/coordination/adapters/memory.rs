//! In-memory key-value store for tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::coordination::ports::{
    KeyValueStore, KeyValueStoreError, KeyValueStoreResult, store::expiry_after,
};

/// Thread-safe in-memory key-value store with clock-driven expiry.
///
/// Clones share the same underlying map, so several lock managers or caches
/// built on clones observe one another like separate processes sharing a
/// remote store.
pub struct InMemoryKeyValueStore<C = DefaultClock>
where
    C: Clock + Send + Sync,
{
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<C>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

impl<C> Clone for InMemoryKeyValueStore<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl InMemoryKeyValueStore<DefaultClock> {
    /// Creates an empty store driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }
}

impl Default for InMemoryKeyValueStore<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InMemoryKeyValueStore<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty store using the given clock for expiry decisions.
    #[must_use]
    pub fn with_clock(clock: Arc<C>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    fn lock_entries(&self) -> KeyValueStoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|err| KeyValueStoreError::backend(std::io::Error::other(err.to_string())))
    }

    /// Returns the live entry for `key`, evicting it first if it has expired.
    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl<C> KeyValueStore for InMemoryKeyValueStore<C>
where
    C: Clock + Send + Sync,
{
    async fn get(&self, key: &str) -> KeyValueStoreResult<Option<String>> {
        let now = self.clock.utc();
        let mut entries = self.lock_entries()?;
        Ok(Self::live_entry(&mut entries, key, now).map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> KeyValueStoreResult<()> {
        let now = self.clock.utc();
        let expires_at = ttl.and_then(|duration| expiry_after(now, duration));
        let mut entries = self.lock_entries()?;
        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> KeyValueStoreResult<bool> {
        let now = self.clock.utc();
        let mut entries = self.lock_entries()?;
        if Self::live_entry(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: expiry_after(now, ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> KeyValueStoreResult<bool> {
        let now = self.clock.utc();
        let mut entries = self.lock_entries()?;
        let existed = Self::live_entry(&mut entries, key, now).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> KeyValueStoreResult<bool> {
        let now = self.clock.utc();
        let mut entries = self.lock_entries()?;
        Ok(Self::live_entry(&mut entries, key, now).is_some())
    }

    async fn increment(&self, key: &str) -> KeyValueStoreResult<i64> {
        let now = self.clock.utc();
        let mut entries = self.lock_entries()?;
        if let Some(entry) = Self::live_entry(&mut entries, key, now) {
            let current = entry
                .value
                .parse::<i64>()
                .map_err(|_| KeyValueStoreError::NotAnInteger(key.to_owned()))?;
            let next = current.saturating_add(1);
            entry.value = next.to_string();
            return Ok(next);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: "1".to_owned(),
                expires_at: None,
            },
        );
        Ok(1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> KeyValueStoreResult<bool> {
        let now = self.clock.utc();
        let mut entries = self.lock_entries()?;
        let matches =
            Self::live_entry(&mut entries, key, now).is_some_and(|entry| entry.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn flush_all(&self) -> KeyValueStoreResult<()> {
        self.lock_entries()?.clear();
        Ok(())
    }
}
