//! Notifier that writes deliveries to the structured log.

use async_trait::async_trait;
use tracing::info;

use crate::queue::ports::{Notifier, NotifierResult};
use crate::task::domain::TaskId;

/// Delivers notifications as `info` log events.
///
/// Stands in for a real delivery channel such as e-mail or push.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, task_id: TaskId, message: &str) -> NotifierResult<()> {
        info!(task_id = %task_id, message, "notification delivered");
        Ok(())
    }
}
