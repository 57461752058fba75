//! Cross-process coordination over a shared key-value store.
//!
//! Two consumers sit on top of the [`ports::KeyValueStore`] contract:
//!
//! - [`LockManager`] serializes mutations of a single resource with
//!   token-guarded, time-bounded locks.
//! - [`Cache`] provides read-through/write-invalidate caching of serialized
//!   values with an independent TTL.
//!
//! Adapters for the store live in [`adapters`].

pub mod adapters;
mod cache;
mod lock;
pub mod ports;

pub use cache::{Cache, CacheError, CacheResult, DEFAULT_CACHE_TTL, FlushPermit};
pub use lock::{LockError, LockGuard, LockManager, LockResult, LockToken};

#[cfg(test)]
mod tests;
