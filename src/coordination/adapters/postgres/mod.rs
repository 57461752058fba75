//! `PostgreSQL` adapter for the shared key-value store.
//!
//! Entries live in the `kv_entries` table. Expiry is evaluated against the
//! database clock so every process sharing the table agrees on liveness.

mod models;
mod store;

pub use store::PostgresKeyValueStore;
