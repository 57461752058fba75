//! In-memory repository for task lifecycle tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{
        SortOrder, Task, TaskId, TaskListQuery, TaskPage, TaskPriority, TaskSort, TaskSortField,
        TaskStats, TaskStatus,
    },
    ports::{
        BatchEdit, TaskEdit, TaskRepository, TaskRepositoryError, TaskRepositoryResult,
        TaskRevision,
    },
};

/// Thread-safe in-memory task repository.
///
/// Each method holds the state lock for its whole duration, which gives the
/// all-or-nothing behaviour the port requires.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskRepositoryResult<RwLockReadGuard<'_, HashMap<TaskId, Task>>> {
        self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> TaskRepositoryResult<RwLockWriteGuard<'_, HashMap<TaskId, Task>>> {
        self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

const fn status_rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Pending => 0,
        TaskStatus::InProgress => 1,
        TaskStatus::Completed => 2,
    }
}

const fn priority_rank(priority: TaskPriority) -> u8 {
    match priority {
        TaskPriority::Low => 0,
        TaskPriority::Medium => 1,
        TaskPriority::High => 2,
    }
}

/// Orders optional due dates with missing values after present ones.
fn compare_due(left: Option<DateTime<Utc>>, right: Option<DateTime<Utc>>) -> Ordering {
    match (left, right) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_tasks(left: &Task, right: &Task, sort: TaskSort) -> Ordering {
    let primary = match sort.field {
        TaskSortField::CreatedAt => left.created_at().cmp(&right.created_at()),
        TaskSortField::UpdatedAt => left.updated_at().cmp(&right.updated_at()),
        TaskSortField::DueDate => compare_due(left.due_date(), right.due_date()),
        TaskSortField::Priority => {
            priority_rank(left.priority()).cmp(&priority_rank(right.priority()))
        }
        TaskSortField::Status => status_rank(left.status()).cmp(&status_rank(right.status())),
        TaskSortField::Title => left.title().cmp(right.title()),
    };
    let directed = match sort.order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    directed.then_with(|| left.id().cmp(&right.id()))
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        if state.contains_key(&task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }
        state.insert(task.id(), task.clone());
        Ok(())
    }

    async fn modify(&self, id: TaskId, edit: TaskEdit) -> TaskRepositoryResult<TaskRevision> {
        let mut state = self.write()?;
        let slot = state.get_mut(&id).ok_or(TaskRepositoryError::NotFound(id))?;
        let previous = slot.clone();
        let current = edit(previous.clone()).map_err(TaskRepositoryError::Rejected)?;
        *slot = current.clone();
        Ok(TaskRevision { previous, current })
    }

    async fn modify_many(
        &self,
        ids: &[TaskId],
        edit: BatchEdit,
    ) -> TaskRepositoryResult<Vec<Task>> {
        let mut state = self.write()?;
        let wanted: HashSet<TaskId> = ids.iter().copied().collect();
        let mut written = Vec::with_capacity(wanted.len());
        for id in wanted {
            if let Some(slot) = state.get_mut(&id) {
                let current = edit(slot.clone());
                *slot = current.clone();
                written.push(current);
            }
        }
        Ok(written)
    }

    async fn remove(&self, id: TaskId) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        state
            .remove(&id)
            .map(|_| ())
            .ok_or(TaskRepositoryError::NotFound(id))
    }

    async fn remove_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<TaskId>> {
        let mut state = self.write()?;
        Ok(ids
            .iter()
            .filter(|id| state.remove(id).is_some())
            .copied()
            .collect())
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self.read()?;
        Ok(state.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        let wanted: HashSet<&TaskId> = ids.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.get(id).cloned())
            .collect())
    }

    async fn list(&self, query: &TaskListQuery) -> TaskRepositoryResult<TaskPage> {
        let state = self.read()?;
        let mut matching: Vec<&Task> = state
            .values()
            .filter(|task| query.filter.matches(task))
            .collect();
        matching.sort_by(|left, right| compare_tasks(left, right, query.sort));

        let total = u64::try_from(matching.len()).map_err(TaskRepositoryError::persistence)?;
        let offset =
            usize::try_from(query.pagination.offset()).map_err(TaskRepositoryError::persistence)?;
        let limit = usize::try_from(query.pagination.limit())
            .map_err(TaskRepositoryError::persistence)?;
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(TaskPage::new(items, total, query.pagination))
    }

    async fn stats(&self) -> TaskRepositoryResult<TaskStats> {
        let state = self.read()?;
        let stats = state.values().fold(TaskStats::default(), |mut acc, task| {
            acc.total += 1;
            match task.status() {
                TaskStatus::Pending => acc.pending += 1,
                TaskStatus::InProgress => acc.in_progress += 1,
                TaskStatus::Completed => acc.completed += 1,
            }
            if task.priority() == TaskPriority::High {
                acc.high_priority += 1;
            }
            acc
        });
        Ok(stats)
    }
}
