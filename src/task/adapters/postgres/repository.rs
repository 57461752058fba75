//! `PostgreSQL` repository implementation for task storage.

use super::{
    models::{NewTaskRow, StatsRow, TaskChangeset, TaskRow},
    schema::tasks,
};
use crate::postgres::{PgPool, get_conn_with, run_blocking_with};
use crate::task::{
    domain::{
        PersistedTaskData, SortOrder, Task, TaskId, TaskListQuery, TaskPage, TaskPriority,
        TaskSort, TaskSortField, TaskStats, TaskStatus, UserId,
    },
    ports::{
        BatchEdit, TaskEdit, TaskRepository, TaskRepositoryError, TaskRepositoryResult,
        TaskRevision,
    },
};
use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::Integer;

const PRIORITY_RANK: &str =
    "CASE tasks.priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END";
const STATUS_RANK: &str =
    "CASE tasks.status WHEN 'pending' THEN 0 WHEN 'in_progress' THEN 1 ELSE 2 END";

/// `PostgreSQL`-backed task repository.
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        run_blocking_with(
            move || {
                let mut connection = get_conn_with(&pool, TaskRepositoryError::persistence)?;
                f(&mut connection)
            },
            TaskRepositoryError::persistence,
        )
        .await
    }
}

impl From<DieselError> for TaskRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

/// Applies the listing filter to any boxed query over `tasks`.
macro_rules! apply_filter {
    ($query:expr, $filter:expr) => {{
        let filter = $filter;
        let mut query = $query;
        if let Some(status) = filter.status {
            query = query.filter(tasks::status.eq(status.as_str()));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(tasks::priority.eq(priority.as_str()));
        }
        if let Some(user_id) = filter.user_id.as_ref() {
            query = query.filter(tasks::user_id.eq(user_id.as_str().to_owned()));
        }
        if let Some(instant) = filter.due_before {
            query = query.filter(tasks::due_date.lt(instant));
        }
        query
    }};
}

fn apply_sort<'a, ST>(
    query: tasks::BoxedQuery<'a, Pg, ST>,
    sort: TaskSort,
) -> tasks::BoxedQuery<'a, Pg, ST> {
    let ordered = match (sort.field, sort.order) {
        (TaskSortField::CreatedAt, SortOrder::Asc) => query.order(tasks::created_at.asc()),
        (TaskSortField::CreatedAt, SortOrder::Desc) => query.order(tasks::created_at.desc()),
        (TaskSortField::UpdatedAt, SortOrder::Asc) => query.order(tasks::updated_at.asc()),
        (TaskSortField::UpdatedAt, SortOrder::Desc) => query.order(tasks::updated_at.desc()),
        (TaskSortField::DueDate, SortOrder::Asc) => query.order(tasks::due_date.asc()),
        (TaskSortField::DueDate, SortOrder::Desc) => query.order(tasks::due_date.desc()),
        (TaskSortField::Title, SortOrder::Asc) => query.order(tasks::title.asc()),
        (TaskSortField::Title, SortOrder::Desc) => query.order(tasks::title.desc()),
        (TaskSortField::Priority, SortOrder::Asc) => {
            query.order(sql::<Integer>(PRIORITY_RANK).asc())
        }
        (TaskSortField::Priority, SortOrder::Desc) => {
            query.order(sql::<Integer>(PRIORITY_RANK).desc())
        }
        (TaskSortField::Status, SortOrder::Asc) => query.order(sql::<Integer>(STATUS_RANK).asc()),
        (TaskSortField::Status, SortOrder::Desc) => {
            query.order(sql::<Integer>(STATUS_RANK).desc())
        }
    };
    ordered.then_order_by(tasks::id.asc())
}

fn update_row(connection: &mut PgConnection, task: &Task) -> TaskRepositoryResult<()> {
    let affected = diesel::update(tasks::table.find(task.id().into_inner()))
        .set(&to_changeset(task))
        .execute(connection)?;
    if affected == 0 {
        return Err(TaskRepositoryError::NotFound(task.id()));
    }
    Ok(())
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let new_row = to_new_row(task);

        self.run_blocking(move |connection| {
            diesel::insert_into(tasks::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskRepositoryError::DuplicateTask(task_id)
                    }
                    _ => TaskRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn modify(&self, id: TaskId, edit: TaskEdit) -> TaskRepositoryResult<TaskRevision> {
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|tx| {
                let row = tasks::table
                    .find(id.into_inner())
                    .select(TaskRow::as_select())
                    .for_update()
                    .first::<TaskRow>(tx)
                    .optional()?;
                let previous = row
                    .map(row_to_task)
                    .transpose()?
                    .ok_or(TaskRepositoryError::NotFound(id))?;
                let current = edit(previous.clone()).map_err(TaskRepositoryError::Rejected)?;
                update_row(tx, &current)?;
                Ok(TaskRevision { previous, current })
            })
        })
        .await
    }

    async fn modify_many(
        &self,
        ids: &[TaskId],
        edit: BatchEdit,
    ) -> TaskRepositoryResult<Vec<Task>> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.into_inner()).collect();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|tx| {
                let rows = tasks::table
                    .filter(tasks::id.eq_any(uuids))
                    .select(TaskRow::as_select())
                    .for_update()
                    .load::<TaskRow>(tx)?;
                let mut written = Vec::with_capacity(rows.len());
                for row in rows {
                    let current = edit(row_to_task(row)?);
                    update_row(tx, &current)?;
                    written.push(current);
                }
                Ok(written)
            })
        })
        .await
    }

    async fn remove(&self, id: TaskId) -> TaskRepositoryResult<()> {
        self.run_blocking(move |connection| {
            let affected =
                diesel::delete(tasks::table.find(id.into_inner())).execute(connection)?;
            if affected == 0 {
                return Err(TaskRepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn remove_many(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<TaskId>> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.into_inner()).collect();
        self.run_blocking(move |connection| {
            let removed = diesel::delete(tasks::table.filter(tasks::id.eq_any(uuids)))
                .returning(tasks::id)
                .get_results::<uuid::Uuid>(connection)?;
            Ok(removed.into_iter().map(TaskId::from_uuid).collect())
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_by_ids(&self, ids: &[TaskId]) -> TaskRepositoryResult<Vec<Task>> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.into_inner()).collect();
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::id.eq_any(uuids))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn list(&self, query: &TaskListQuery) -> TaskRepositoryResult<TaskPage> {
        let query = query.clone();
        self.run_blocking(move |connection| {
            let offset = i64::try_from(query.pagination.offset())
                .map_err(TaskRepositoryError::persistence)?;
            let limit = i64::from(query.pagination.limit());

            let total: i64 = apply_filter!(tasks::table.count().into_boxed(), &query.filter)
                .get_result(connection)?;
            let selection = apply_filter!(
                tasks::table.select(TaskRow::as_select()).into_boxed(),
                &query.filter
            );
            let rows = apply_sort(selection, query.sort)
                .offset(offset)
                .limit(limit)
                .load::<TaskRow>(connection)?;

            let items = rows
                .into_iter()
                .map(row_to_task)
                .collect::<TaskRepositoryResult<Vec<_>>>()?;
            let total = u64::try_from(total).map_err(TaskRepositoryError::persistence)?;
            Ok(TaskPage::new(items, total, query.pagination))
        })
        .await
    }

    async fn stats(&self) -> TaskRepositoryResult<TaskStats> {
        self.run_blocking(|connection| {
            let row = diesel::sql_query(concat!(
                "SELECT COUNT(*) AS total, ",
                "COUNT(*) FILTER (WHERE status = 'completed') AS completed, ",
                "COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress, ",
                "COUNT(*) FILTER (WHERE status = 'pending') AS pending, ",
                "COUNT(*) FILTER (WHERE priority = 'high') AS high_priority ",
                "FROM tasks",
            ))
            .get_result::<StatsRow>(connection)?;
            row_to_stats(&row)
        })
        .await
    }
}

fn to_new_row(task: &Task) -> NewTaskRow {
    NewTaskRow {
        id: task.id().into_inner(),
        title: task.title().to_owned(),
        description: task.description().to_owned(),
        status: task.status().as_str().to_owned(),
        priority: task.priority().as_str().to_owned(),
        due_date: task.due_date(),
        user_id: task.user_id().as_str().to_owned(),
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    }
}

fn to_changeset(task: &Task) -> TaskChangeset {
    TaskChangeset {
        title: task.title().to_owned(),
        description: task.description().to_owned(),
        status: task.status().as_str().to_owned(),
        priority: task.priority().as_str().to_owned(),
        due_date: task.due_date(),
        user_id: task.user_id().as_str().to_owned(),
        updated_at: task.updated_at(),
    }
}

fn row_to_task(row: TaskRow) -> TaskRepositoryResult<Task> {
    let TaskRow {
        id,
        title,
        description,
        status: persisted_status,
        priority: persisted_priority,
        due_date,
        user_id: persisted_user_id,
        created_at,
        updated_at,
    } = row;

    let status = TaskStatus::try_from(persisted_status.as_str())
        .map_err(TaskRepositoryError::persistence)?;
    let priority = TaskPriority::try_from(persisted_priority.as_str())
        .map_err(TaskRepositoryError::persistence)?;
    let user_id = UserId::new(persisted_user_id).map_err(TaskRepositoryError::persistence)?;

    Ok(Task::from_persisted(PersistedTaskData {
        id: TaskId::from_uuid(id),
        title,
        description,
        status,
        priority,
        due_date,
        user_id,
        created_at,
        updated_at,
    }))
}

fn row_to_stats(row: &StatsRow) -> TaskRepositoryResult<TaskStats> {
    let count = |value: i64| u64::try_from(value).map_err(TaskRepositoryError::persistence);
    Ok(TaskStats {
        total: count(row.total)?,
        completed: count(row.completed)?,
        in_progress: count(row.in_progress)?,
        pending: count(row.pending)?,
        high_priority: count(row.high_priority)?,
    })
}
