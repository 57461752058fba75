//! Outbound notification port.

use crate::task::domain::TaskId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for notification delivery.
pub type NotifierResult<T> = Result<T, NotifierError>;

/// Delivers messages about tasks to their owners.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `message` about `task_id`.
    async fn notify(&self, task_id: TaskId, message: &str) -> NotifierResult<()>;
}

/// Errors returned by notifier implementations.
#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    /// Delivery channel failure.
    #[error("notification delivery failed: {0}")]
    Delivery(Arc<dyn std::error::Error + Send + Sync>),
}

impl NotifierError {
    /// Wraps a delivery error.
    pub fn delivery(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Delivery(Arc::new(err))
    }
}
