//! Token-guarded distributed locks over the shared key-value store.

use super::ports::{KeyValueStore, KeyValueStoreError, store::expiry_after};
use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque token proving ownership of one lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the token value as stored in the shared store.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors returned by [`LockManager`].
#[derive(Debug, Clone, Error)]
pub enum LockError {
    /// Another holder owns a live lock for the key.
    #[error("lock '{key}' is held by another owner")]
    Held {
        /// Lock key that could not be acquired.
        key: String,
    },

    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] KeyValueStoreError),
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Clone)]
struct HeldLock {
    token: LockToken,
    expires_at: Option<DateTime<Utc>>,
}

impl HeldLock {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Per-process lock manager.
///
/// Each instance owns the table of locks it currently holds, keyed by lock
/// key and recording the token and local expiry of each acquisition. Share
/// one instance per process through an `Arc` rather than creating several;
/// two managers over the same store behave like two processes competing for
/// the same keys.
pub struct LockManager<S, C = DefaultClock>
where
    S: KeyValueStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    held: Mutex<HashMap<String, HeldLock>>,
}

impl<S, C> LockManager<S, C>
where
    S: KeyValueStore,
    C: Clock + Send + Sync,
{
    /// Creates a lock manager over the shared store.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            store,
            clock,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the lock key for a resource class and identifier.
    #[must_use]
    pub fn key_for(resource: &str, id: impl fmt::Display) -> String {
        format!("lock:{resource}:{id}")
    }

    fn held_locks(&self) -> MutexGuard<'_, HashMap<String, HeldLock>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attempts to acquire `key` for `ttl`.
    ///
    /// Never waits: the call either claims the lock immediately or reports
    /// that it is held. Retry policy belongs to the caller. A key this
    /// manager already holds with a live local expiry is reported as held
    /// without a store round trip.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Held`] when a live lock exists for `key`, or
    /// [`LockError::Store`] when the shared store fails.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> LockResult<LockToken> {
        let now = self.clock.utc();
        if self
            .held_locks()
            .get(key)
            .is_some_and(|held| held.is_live(now))
        {
            return Err(LockError::Held {
                key: key.to_owned(),
            });
        }

        let token = LockToken::generate();
        let acquired = self
            .store
            .set_if_absent(key, token.as_str(), ttl)
            .await?;
        if !acquired {
            return Err(LockError::Held {
                key: key.to_owned(),
            });
        }

        self.held_locks().insert(
            key.to_owned(),
            HeldLock {
                token: token.clone(),
                expires_at: expiry_after(now, ttl),
            },
        );
        Ok(token)
    }

    /// Releases the acquisition of `key` identified by `token`.
    ///
    /// A no-op returning `false` unless the local table still records
    /// `token` for `key`: a holder whose lock lapsed and was reacquired
    /// within this process leaves the newer acquisition untouched. When the
    /// tokens match, the local record is dropped and the shared entry is
    /// removed only if it still carries `token`. Returns `true` when the
    /// shared entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] when the shared store fails.
    pub async fn release(&self, key: &str, token: &LockToken) -> LockResult<bool> {
        if !self.forget(key, token) {
            return Ok(false);
        }
        Ok(self.store.compare_and_delete(key, token.as_str()).await?)
    }

    /// Drops the local record for `key` if it carries `token`.
    fn forget(&self, key: &str, token: &LockToken) -> bool {
        let mut held = self.held_locks();
        if held.get(key).is_none_or(|entry| entry.token != *token) {
            return false;
        }
        held.remove(key);
        true
    }
}

impl<S, C> LockManager<S, C>
where
    S: KeyValueStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Acquires `key` for `ttl` and returns a guard that releases it.
    ///
    /// The guard releases on every exit path: explicitly through
    /// [`LockGuard::release`], or on drop when the owning future returns
    /// early, panics or is cancelled.
    ///
    /// # Errors
    ///
    /// Same as [`LockManager::acquire`].
    pub async fn lock(self: &Arc<Self>, key: &str, ttl: Duration) -> LockResult<LockGuard<S, C>> {
        let token = self.acquire(key, ttl).await?;
        Ok(LockGuard {
            manager: Arc::clone(self),
            key: key.to_owned(),
            token: Some(token),
        })
    }
}

/// Scoped ownership of one lock acquisition.
///
/// Dropping an unreleased guard clears the local record at once and hands
/// the shared compare-and-delete to the current Tokio runtime. Without a
/// runtime the shared entry is left to expire through its TTL.
pub struct LockGuard<S, C = DefaultClock>
where
    S: KeyValueStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    manager: Arc<LockManager<S, C>>,
    key: String,
    token: Option<LockToken>,
}

impl<S, C> LockGuard<S, C>
where
    S: KeyValueStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Returns the guarded lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the acquisition token.
    #[must_use]
    pub const fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    /// Releases the lock now and reports whether the shared entry was
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] when the shared store fails; the shared
    /// entry then expires through its TTL.
    pub async fn release(mut self) -> LockResult<bool> {
        let Some(token) = self.token.take() else {
            return Ok(false);
        };
        self.manager.release(&self.key, &token).await
    }
}

impl<S, C> Drop for LockGuard<S, C>
where
    S: KeyValueStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        if !self.manager.forget(&self.key, &token) {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(key = %self.key, "no runtime to release lock; waiting for TTL");
            return;
        };
        let manager = Arc::clone(&self.manager);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            match manager.store.compare_and_delete(&key, token.as_str()).await {
                Ok(removed) => debug!(key, removed, "lock released on drop"),
                Err(err) => warn!(key, error = %err, "lock release failed; waiting for TTL"),
            }
        });
    }
}
