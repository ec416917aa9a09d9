//! In-memory reindexing task store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use search_sync_shared::{
    NewReindexingSubtask, NewReindexingTask, ReindexingSlice, ReindexingState, ReindexingSubtask,
    ReindexingTask,
};

use crate::errors::StoreError;
use crate::interfaces::ReindexingRepository;

#[derive(Debug, Default)]
struct Tables {
    tasks: Vec<ReindexingTask>,
    subtasks: Vec<ReindexingSubtask>,
    slices: Vec<ReindexingSlice>,
}

impl Tables {
    fn task_mut(&mut self, task_id: i64) -> Result<&mut ReindexingTask, StoreError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| StoreError::not_found(format!("reindexing task {}", task_id)))
    }

    fn slice_mut(&mut self, slice_id: i64) -> Result<&mut ReindexingSlice, StoreError> {
        self.slices
            .iter_mut()
            .find(|s| s.id == slice_id)
            .ok_or_else(|| StoreError::not_found(format!("reindexing slice {}", slice_id)))
    }
}

/// Reindexing state kept in process memory. Rows get sequential ids.
#[derive(Debug, Default)]
pub struct InMemoryReindexingRepository {
    tables: Mutex<Tables>,
}

impl InMemoryReindexingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReindexingRepository for InMemoryReindexingRepository {
    async fn create_task(&self, task: NewReindexingTask) -> Result<ReindexingTask, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let row = ReindexingTask {
            id: tables.tasks.len() as i64 + 1,
            state: ReindexingState::Initial,
            error_message: None,
            max_slices_running: task.max_slices_running,
            slice_multiplier: task.slice_multiplier,
            delete_original_index_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.tasks.push(row.clone());
        Ok(row)
    }

    async fn current_task(&self) -> Result<Option<ReindexingTask>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tasks
            .iter()
            .rev()
            .find(|t| !t.state.is_terminal())
            .cloned())
    }

    async fn latest_task(&self) -> Result<Option<ReindexingTask>, StoreError> {
        Ok(self.tables.lock().await.tasks.last().cloned())
    }

    async fn get_task(&self, task_id: i64) -> Result<ReindexingTask, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.task_mut(task_id)?.clone())
    }

    async fn transition(
        &self,
        task_id: i64,
        state: ReindexingState,
        error_message: Option<String>,
    ) -> Result<ReindexingTask, StoreError> {
        let mut tables = self.tables.lock().await;
        let task = tables.task_mut(task_id)?;
        if !task.state.can_transition_to(state) {
            return Err(StoreError::InvalidTransition {
                from: task.state,
                to: state,
            });
        }
        task.state = state;
        if error_message.is_some() {
            task.error_message = error_message;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn set_delete_original_index_at(
        &self,
        task_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let task = tables.task_mut(task_id)?;
        task.delete_original_index_at = at;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn tasks_with_indices_to_delete(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReindexingTask>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tasks
            .iter()
            .filter(|t| t.state == ReindexingState::Success)
            .filter(|t| t.delete_original_index_at.is_some_and(|at| at <= now))
            .cloned()
            .collect())
    }

    async fn create_subtask(
        &self,
        task_id: i64,
        subtask: NewReindexingSubtask,
        max_slice: i32,
    ) -> Result<ReindexingSubtask, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.task_mut(task_id)?;

        let row = ReindexingSubtask {
            id: tables.subtasks.len() as i64 + 1,
            task_id,
            alias_name: subtask.alias_name,
            index_name_from: subtask.index_name_from,
            index_name_to: subtask.index_name_to,
            documents_count: subtask.documents_count,
            documents_count_target: None,
        };
        for slice in 0..max_slice {
            let id = tables.slices.len() as i64 + 1;
            tables.slices.push(ReindexingSlice {
                id,
                subtask_id: row.id,
                elastic_slice: slice,
                elastic_max_slice: max_slice,
                elastic_task: None,
                retry_attempt: 0,
                completed: false,
            });
        }
        tables.subtasks.push(row.clone());
        Ok(row)
    }

    async fn subtasks(&self, task_id: i64) -> Result<Vec<ReindexingSubtask>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subtasks
            .iter()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn set_documents_count_target(
        &self,
        subtask_id: i64,
        count: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let subtask = tables
            .subtasks
            .iter_mut()
            .find(|s| s.id == subtask_id)
            .ok_or_else(|| StoreError::not_found(format!("reindexing subtask {}", subtask_id)))?;
        subtask.documents_count_target = Some(count);
        Ok(())
    }

    async fn slices(&self, subtask_id: i64) -> Result<Vec<ReindexingSlice>, StoreError> {
        let tables = self.tables.lock().await;
        let mut slices: Vec<ReindexingSlice> = tables
            .slices
            .iter()
            .filter(|s| s.subtask_id == subtask_id)
            .cloned()
            .collect();
        slices.sort_by_key(|s| s.elastic_slice);
        Ok(slices)
    }

    async fn set_slice_task(
        &self,
        slice_id: i64,
        elastic_task: &str,
        retry_attempt: i32,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let slice = tables.slice_mut(slice_id)?;
        slice.elastic_task = Some(elastic_task.to_string());
        slice.retry_attempt = retry_attempt;
        Ok(())
    }

    async fn mark_slice_completed(&self, slice_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.slice_mut(slice_id)?.completed = true;
        Ok(())
    }
}
