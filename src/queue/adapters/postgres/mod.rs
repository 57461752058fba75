//! `PostgreSQL` adapter for the durable job queue.
//!
//! Jobs live in the `jobs` table. Reservation locks the candidate row with
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never receive the same
//! job, and a lease lets another worker redeliver a job whose consumer died.

mod models;
mod queue;
mod schema;

pub use queue::{DEFAULT_LEASE, PostgresJobQueue};
