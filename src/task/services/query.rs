//! Read-side orchestration with a read-through cache for point reads.

use super::{TASK_RESOURCE, TaskReader, TaskServiceResult};
use crate::coordination::{Cache, ports::KeyValueStore};
use crate::task::{
    domain::{Task, TaskId, TaskListQuery, TaskPage, TaskStats},
    ports::TaskRepository,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Task query service.
///
/// Only point reads use the cache. Listings and stats always go to the
/// store, and a store miss is never cached so a task created moments later
/// is visible immediately.
pub struct TaskQueryService<R, S>
where
    R: TaskRepository,
    S: KeyValueStore,
{
    repository: Arc<R>,
    cache: Arc<Cache<S>>,
}

impl<R, S> TaskQueryService<R, S>
where
    R: TaskRepository,
    S: KeyValueStore,
{
    /// Creates a query service.
    #[must_use]
    pub const fn new(repository: Arc<R>, cache: Arc<Cache<S>>) -> Self {
        Self { repository, cache }
    }
}

#[async_trait]
impl<R, S> TaskReader for TaskQueryService<R, S>
where
    R: TaskRepository,
    S: KeyValueStore,
{
    async fn get_by_id(&self, id: TaskId) -> TaskServiceResult<Option<Task>> {
        let key = Cache::<S>::key_for(TASK_RESOURCE, id);
        match self.cache.get::<Task>(&key).await {
            Ok(Some(task)) => return Ok(Some(task)),
            Ok(None) => debug!(task_id = %id, "task cache miss"),
            Err(err) => warn!(task_id = %id, error = %err, "cache read failed; using store"),
        }

        let found = self.repository.find_by_id(id).await?;
        if let Some(task) = &found
            && let Err(err) = self.cache.set(&key, task, None).await
        {
            warn!(task_id = %id, error = %err, "cache population failed");
        }
        Ok(found)
    }

    async fn list(&self, query: &TaskListQuery) -> TaskServiceResult<TaskPage> {
        Ok(self.repository.list(query).await?)
    }

    async fn get_by_ids(&self, ids: &[TaskId]) -> TaskServiceResult<Vec<Task>> {
        Ok(self.repository.find_by_ids(ids).await?)
    }

    async fn stats(&self) -> TaskServiceResult<TaskStats> {
        Ok(self.repository.stats().await?)
    }
}
