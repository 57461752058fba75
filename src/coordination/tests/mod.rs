//! Unit tests for locks, caching, and the in-memory store.
