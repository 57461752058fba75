//! Task lifecycle management.
//!
//! Tasks are created, patched, transitioned between statuses, deleted
//! singly or in batches, and read back by ID, by filtered listing or as
//! aggregate counts. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Command and query services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
