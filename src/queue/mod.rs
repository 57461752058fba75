//! Durable job queue and its consumers.
//!
//! Task mutations emit [`domain::JobPayload`]s through the
//! [`ports::JobQueue`]; the [`services::TaskProcessor`] consumes them in a
//! separate execution context under retry and backoff, and the
//! [`services::OverdueScanner`] periodically schedules sweeps.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Consumer services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
