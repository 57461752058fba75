//! Port contracts for the job queue.

mod handler;
mod notifier;
mod queue;

pub use handler::JobHandler;
pub use notifier::{Notifier, NotifierError, NotifierResult};
pub use queue::{JobQueue, JobQueueError, JobQueueResult};
