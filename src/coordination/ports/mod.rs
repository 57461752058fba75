//! Port contracts for shared coordination state.

pub mod store;

pub use store::{KeyValueStore, KeyValueStoreError, KeyValueStoreResult};
