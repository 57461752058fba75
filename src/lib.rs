//! Taskflow: task lifecycle management with coordinated writes and
//! background job processing.
//!
//! Writes to a task are serialized across processes by a per-task lock in a
//! shared key-value store, point reads go through a read-through cache in
//! the same store, and every mutation emits a job onto a durable queue for
//! asynchronous follow-up work such as overdue notifications.
//!
//! # Architecture
//!
//! Taskflow follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//!
//! # Modules
//!
//! - [`coordination`]: Shared key-value store, distributed locks and cache
//! - [`task`]: Task validation, persistence and command/query services
//! - [`queue`]: Durable jobs, the task processor and the overdue scanner
//! - [`config`]: Runtime configuration
//! - [`postgres`]: Connection pool plumbing shared by `PostgreSQL` adapters

pub mod config;
pub mod coordination;
pub mod postgres;
pub mod queue;
pub mod task;
