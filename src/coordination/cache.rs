//! Read-through, write-invalidate cache over the shared key-value store.

use super::ports::{KeyValueStore, KeyValueStoreError};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default cache entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Capability required to flush the entire cache.
///
/// Only [`crate::config::TaskflowConfig::flush_permit`] hands these out, and
/// only outside production.
#[derive(Debug)]
pub struct FlushPermit(());

impl FlushPermit {
    pub(crate) const fn new() -> Self {
        Self(())
    }
}

/// Errors returned by [`Cache`].
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The value could not be serialized.
    #[error("failed to encode cache value: {0}")]
    Encode(Arc<serde_json::Error>),

    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] KeyValueStoreError),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// JSON-encoding cache with a default TTL.
pub struct Cache<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    default_ttl: Duration,
}

impl<S> Cache<S>
where
    S: KeyValueStore,
{
    /// Creates a cache with the given default entry lifetime.
    #[must_use]
    pub const fn new(store: Arc<S>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Builds the cache key for an entity type and identifier.
    #[must_use]
    pub fn key_for(entity: &str, id: impl fmt::Display) -> String {
        format!("{entity}:{id}")
    }

    /// Returns the default entry lifetime.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Looks up and decodes the value under `key`.
    ///
    /// A value that fails to decode is reported as a miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] when the shared store fails.
    pub async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                debug!(key, error = %err, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Encodes and stores `value` under `key`.
    ///
    /// Uses the default TTL when `ttl` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] when serialization fails, or
    /// [`CacheError::Store`] when the shared store fails.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        let encoded =
            serde_json::to_string(value).map_err(|err| CacheError::Encode(Arc::new(err)))?;
        let lifetime = ttl.unwrap_or(self.default_ttl);
        self.store.set(key, &encoded, Some(lifetime)).await?;
        Ok(())
    }

    /// Removes the entry under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] when the shared store fails.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.store.delete(key).await?;
        Ok(())
    }

    /// Returns whether a live entry exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] when the shared store fails.
    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.store.exists(key).await?)
    }

    /// Flushes every entry in the underlying store.
    ///
    /// This also drops lock entries sharing the store, which is why it
    /// demands a [`FlushPermit`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] when the shared store fails.
    pub async fn clear(&self, _permit: &FlushPermit) -> CacheResult<()> {
        self.store.flush_all().await?;
        Ok(())
    }
}
