//! PostgreSQL implementation of the reindexing task store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use search_sync_shared::{
    NewReindexingSubtask, NewReindexingTask, ReindexingSlice, ReindexingState, ReindexingSubtask,
    ReindexingTask,
};

use crate::errors::StoreError;
use crate::interfaces::ReindexingRepository;

const TASK_COLUMNS: &str = "id, state, error_message, max_slices_running, slice_multiplier, \
                            delete_original_index_at, created_at, updated_at";

const SUBTASK_COLUMNS: &str = "id, task_id, alias_name, index_name_from, index_name_to, \
                               documents_count, documents_count_target";

const SLICE_COLUMNS: &str =
    "id, subtask_id, elastic_slice, elastic_max_slice, elastic_task, retry_attempt, completed";

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    state: String,
    error_message: Option<String>,
    max_slices_running: i32,
    slice_multiplier: i32,
    delete_original_index_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for ReindexingTask {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<ReindexingState>()
            .map_err(|e| StoreError::corrupt_row(format!("task {}: {}", row.id, e)))?;

        Ok(ReindexingTask {
            id: row.id,
            state,
            error_message: row.error_message,
            max_slices_running: row.max_slices_running,
            slice_multiplier: row.slice_multiplier,
            delete_original_index_at: row.delete_original_index_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SubtaskRow {
    id: i64,
    task_id: i64,
    alias_name: String,
    index_name_from: String,
    index_name_to: String,
    documents_count: i64,
    documents_count_target: Option<i64>,
}

impl From<SubtaskRow> for ReindexingSubtask {
    fn from(row: SubtaskRow) -> Self {
        ReindexingSubtask {
            id: row.id,
            task_id: row.task_id,
            alias_name: row.alias_name,
            index_name_from: row.index_name_from,
            index_name_to: row.index_name_to,
            documents_count: row.documents_count,
            documents_count_target: row.documents_count_target,
        }
    }
}

#[derive(Debug, FromRow)]
struct SliceRow {
    id: i64,
    subtask_id: i64,
    elastic_slice: i32,
    elastic_max_slice: i32,
    elastic_task: Option<String>,
    retry_attempt: i32,
    completed: bool,
}

impl From<SliceRow> for ReindexingSlice {
    fn from(row: SliceRow) -> Self {
        ReindexingSlice {
            id: row.id,
            subtask_id: row.subtask_id,
            elastic_slice: row.elastic_slice,
            elastic_max_slice: row.elastic_max_slice,
            elastic_task: row.elastic_task,
            retry_attempt: row.retry_attempt,
            completed: row.completed,
        }
    }
}

/// PostgreSQL-backed reindexing task store.
pub struct PostgresReindexingRepository {
    pool: sqlx::PgPool,
}

impl PostgresReindexingRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    fn task_not_found(task_id: i64) -> StoreError {
        StoreError::not_found(format!("reindexing task {}", task_id))
    }
}

#[async_trait]
impl ReindexingRepository for PostgresReindexingRepository {
    async fn create_task(&self, task: NewReindexingTask) -> Result<ReindexingTask, StoreError> {
        let row: TaskRow = sqlx::query_as(&format!(
            "INSERT INTO search_sync_reindexing_tasks (state, max_slices_running, slice_multiplier) \
             VALUES ($1, $2, $3) RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(ReindexingState::Initial.as_str())
        .bind(task.max_slices_running)
        .bind(task.slice_multiplier)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn current_task(&self) -> Result<Option<ReindexingTask>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM search_sync_reindexing_tasks \
             WHERE state NOT IN ('success', 'failure') ORDER BY id DESC LIMIT 1",
            TASK_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn latest_task(&self) -> Result<Option<ReindexingTask>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM search_sync_reindexing_tasks ORDER BY id DESC LIMIT 1",
            TASK_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_task(&self, task_id: i64) -> Result<ReindexingTask, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM search_sync_reindexing_tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Self::task_not_found(task_id))?.try_into()
    }

    async fn transition(
        &self,
        task_id: i64,
        state: ReindexingState,
        error_message: Option<String>,
    ) -> Result<ReindexingTask, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> = sqlx::query_scalar(
            "SELECT state FROM search_sync_reindexing_tasks WHERE id = $1 FOR UPDATE",
        )
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?;
        let current = current
            .ok_or_else(|| Self::task_not_found(task_id))?
            .parse::<ReindexingState>()
            .map_err(|e| StoreError::corrupt_row(format!("task {}: {}", task_id, e)))?;

        if !current.can_transition_to(state) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: state,
            });
        }

        let row: TaskRow = sqlx::query_as(&format!(
            "UPDATE search_sync_reindexing_tasks \
             SET state = $2, error_message = COALESCE($3, error_message), updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(state.as_str())
        .bind(error_message)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        row.try_into()
    }

    async fn set_delete_original_index_at(
        &self,
        task_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE search_sync_reindexing_tasks \
             SET delete_original_index_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(task_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::task_not_found(task_id));
        }
        Ok(())
    }

    async fn tasks_with_indices_to_delete(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReindexingTask>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM search_sync_reindexing_tasks \
             WHERE state = 'success' AND delete_original_index_at <= $1 ORDER BY id ASC",
            TASK_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_subtask(
        &self,
        task_id: i64,
        subtask: NewReindexingSubtask,
        max_slice: i32,
    ) -> Result<ReindexingSubtask, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: SubtaskRow = sqlx::query_as(&format!(
            "INSERT INTO search_sync_reindexing_subtasks \
             (task_id, alias_name, index_name_from, index_name_to, documents_count) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            SUBTASK_COLUMNS
        ))
        .bind(task_id)
        .bind(&subtask.alias_name)
        .bind(&subtask.index_name_from)
        .bind(&subtask.index_name_to)
        .bind(subtask.documents_count)
        .fetch_one(&mut *tx)
        .await?;

        for slice in 0..max_slice {
            sqlx::query(
                "INSERT INTO search_sync_reindexing_slices \
                 (subtask_id, elastic_slice, elastic_max_slice) VALUES ($1, $2, $3)",
            )
            .bind(row.id)
            .bind(slice)
            .bind(max_slice)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(row.into())
    }

    async fn subtasks(&self, task_id: i64) -> Result<Vec<ReindexingSubtask>, StoreError> {
        let rows: Vec<SubtaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM search_sync_reindexing_subtasks WHERE task_id = $1 ORDER BY id ASC",
            SUBTASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_documents_count_target(
        &self,
        subtask_id: i64,
        count: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE search_sync_reindexing_subtasks SET documents_count_target = $2 WHERE id = $1",
        )
        .bind(subtask_id)
        .bind(count)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "reindexing subtask {}",
                subtask_id
            )));
        }
        Ok(())
    }

    async fn slices(&self, subtask_id: i64) -> Result<Vec<ReindexingSlice>, StoreError> {
        let rows: Vec<SliceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM search_sync_reindexing_slices \
             WHERE subtask_id = $1 ORDER BY elastic_slice ASC",
            SLICE_COLUMNS
        ))
        .bind(subtask_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_slice_task(
        &self,
        slice_id: i64,
        elastic_task: &str,
        retry_attempt: i32,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE search_sync_reindexing_slices \
             SET elastic_task = $2, retry_attempt = $3 WHERE id = $1",
        )
        .bind(slice_id)
        .bind(elastic_task)
        .bind(retry_attempt)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("reindexing slice {}", slice_id)));
        }
        Ok(())
    }

    async fn mark_slice_completed(&self, slice_id: i64) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE search_sync_reindexing_slices SET completed = TRUE WHERE id = $1")
                .bind(slice_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("reindexing slice {}", slice_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "src/postgres/migrations")]
    async fn transition_rejects_backwards_moves(pool: sqlx::PgPool) {
        let repo = PostgresReindexingRepository::new(pool);
        let task = repo.create_task(NewReindexingTask::default()).await.unwrap();

        repo.transition(task.id, ReindexingState::IndexingPaused, None)
            .await
            .unwrap();
        let err = repo
            .transition(task.id, ReindexingState::Initial, None)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[sqlx::test(migrations = "src/postgres/migrations")]
    async fn subtask_is_created_with_numbered_slices(pool: sqlx::PgPool) {
        let repo = PostgresReindexingRepository::new(pool);
        let task = repo.create_task(NewReindexingTask::default()).await.unwrap();
        let subtask = repo
            .create_subtask(
                task.id,
                NewReindexingSubtask {
                    alias_name: "search-sync".to_string(),
                    index_name_from: "search-sync-a".to_string(),
                    index_name_to: "search-sync-b".to_string(),
                    documents_count: 10,
                },
                3,
            )
            .await
            .unwrap();

        let slices = repo.slices(subtask.id).await.unwrap();
        let numbers: Vec<i32> = slices.iter().map(|s| s.elastic_slice).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert!(slices.iter().all(|s| s.elastic_max_slice == 3 && !s.completed));
    }

    #[sqlx::test(migrations = "src/postgres/migrations")]
    async fn failure_message_is_kept(pool: sqlx::PgPool) {
        let repo = PostgresReindexingRepository::new(pool);
        let task = repo.create_task(NewReindexingTask::default()).await.unwrap();

        let failed = repo
            .transition(task.id, ReindexingState::Failure, Some("boom".to_string()))
            .await
            .unwrap();

        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert!(repo.current_task().await.unwrap().is_none());
    }
}
