//! Persistence for cluster reindexing tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use search_sync_shared::{
    NewReindexingSubtask, NewReindexingTask, ReindexingSlice, ReindexingState, ReindexingSubtask,
    ReindexingTask,
};

use crate::errors::StoreError;

/// Trait for the persisted task/subtask/slice state.
///
/// This is what makes a reindex survive process restarts: every step of the
/// state machine reads its inputs from here and writes its outcome back
/// before returning.
#[async_trait]
pub trait ReindexingRepository: Send + Sync {
    /// Insert a task in the `initial` state.
    async fn create_task(&self, task: NewReindexingTask) -> Result<ReindexingTask, StoreError>;

    /// The most recent task that is not in a terminal state.
    async fn current_task(&self) -> Result<Option<ReindexingTask>, StoreError>;

    /// The most recent task of any state.
    async fn latest_task(&self) -> Result<Option<ReindexingTask>, StoreError>;

    async fn get_task(&self, task_id: i64) -> Result<ReindexingTask, StoreError>;

    /// Move a task to `state`, recording `error_message` when given.
    ///
    /// Fails with `StoreError::InvalidTransition` unless
    /// `ReindexingState::can_transition_to` allows the change.
    async fn transition(
        &self,
        task_id: i64,
        state: ReindexingState,
        error_message: Option<String>,
    ) -> Result<ReindexingTask, StoreError>;

    async fn set_delete_original_index_at(
        &self,
        task_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Successful tasks whose original indices are due for deletion at `now`.
    async fn tasks_with_indices_to_delete(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReindexingTask>, StoreError>;

    /// Insert a subtask together with its `max_slice` slices, numbered `0..max_slice`.
    async fn create_subtask(
        &self,
        task_id: i64,
        subtask: NewReindexingSubtask,
        max_slice: i32,
    ) -> Result<ReindexingSubtask, StoreError>;

    /// Subtasks of a task in creation order.
    async fn subtasks(&self, task_id: i64) -> Result<Vec<ReindexingSubtask>, StoreError>;

    async fn set_documents_count_target(
        &self,
        subtask_id: i64,
        count: i64,
    ) -> Result<(), StoreError>;

    /// Slices of a subtask ordered by `elastic_slice`.
    async fn slices(&self, subtask_id: i64) -> Result<Vec<ReindexingSlice>, StoreError>;

    /// Record a freshly dispatched engine task, replacing the previous handle.
    async fn set_slice_task(
        &self,
        slice_id: i64,
        elastic_task: &str,
        retry_attempt: i32,
    ) -> Result<(), StoreError>;

    async fn mark_slice_completed(&self, slice_id: i64) -> Result<(), StoreError>;
}
