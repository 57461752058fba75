//! Queue consumers and producers.

mod processor;
mod scanner;
mod worker;

pub use processor::{SweepSettings, TaskProcessor};
pub use scanner::{OverdueScanner, ScannerSettings};
pub use worker::{QueueWorker, WorkerSettings};
