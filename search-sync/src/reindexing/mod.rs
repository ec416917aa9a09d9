//! Cluster reindexing orchestrator.
//!
//! Migrates every alias to a new index generation through a persisted state
//! machine. Each call to [`ClusterReindexingService::execute`] runs one step
//! for the current task and stores its outcome, so a reindex survives
//! restarts and can span many scheduler ticks:
//!
//! 1. **initial**: check preconditions and pause indexing
//! 2. **indexing_paused**: create the target indices, subtasks and slices
//! 3. **reindexing**: poll, retry and dispatch slices; once all are done,
//!    verify counts, restore settings, switch aliases and unpause
//!
//! Slice and precondition failures end the task in `failure` with a message
//! for operators. Infrastructure errors are returned instead and the step is
//! retried on the next call.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::errors::ReindexingError;
use crate::indexing_control::IndexingControl;
use search_sync_repository::opensearch::{
    bulk_load_index_body, steady_state_settings, target_index_name,
};
use search_sync_repository::{
    AliasSwitch, IndexLayout, MigrationTracker, ReindexingRepository, SearchEngineClient,
    SearchIndexError,
};
use search_sync_shared::{
    NewReindexingSubtask, NewReindexingTask, ReindexingSlice, ReindexingState, ReindexingSubtask,
    ReindexingTask,
};

/// Default number of redispatches a slice gets before the task fails.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: i32 = 20;

/// Default grace period before the previous index generation is deleted.
pub const DEFAULT_DELETE_ORIGINAL_INDEX_AFTER_DAYS: i64 = 14;

/// Free storage required, as a multiple of the current index size.
const STORAGE_MARGIN: u64 = 2;

const ALIASES_REQUIRED: &str = "Your search index must first use aliases before you can use this feature. Please recreate your index from scratch before reindexing.";

const PENDING_MIGRATIONS: &str = "You have unapplied search migrations. Please wait until it is finished or fix the migrations before reindexing.";

/// Configuration for the reindexing service.
#[derive(Debug, Clone, Copy)]
pub struct ReindexingConfig {
    pub max_retry_attempts: i32,
    pub delete_original_index_after: ChronoDuration,
}

impl Default for ReindexingConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            delete_original_index_after: ChronoDuration::days(
                DEFAULT_DELETE_ORIGINAL_INDEX_AFTER_DAYS,
            ),
        }
    }
}

/// Outcome of polling one running slice.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SliceCheck {
    Pending,
    Done,
    Failed(String),
}

/// Drives reindexing tasks through their states.
pub struct ClusterReindexingService {
    client: Arc<dyn SearchEngineClient>,
    repository: Arc<dyn ReindexingRepository>,
    control: Arc<IndexingControl>,
    migrations: Arc<dyn MigrationTracker>,
    layout: IndexLayout,
    config: ReindexingConfig,
}

impl ClusterReindexingService {
    pub fn new(
        client: Arc<dyn SearchEngineClient>,
        repository: Arc<dyn ReindexingRepository>,
        control: Arc<IndexingControl>,
        migrations: Arc<dyn MigrationTracker>,
        layout: IndexLayout,
    ) -> Self {
        Self::with_config(
            client,
            repository,
            control,
            migrations,
            layout,
            ReindexingConfig::default(),
        )
    }

    pub fn with_config(
        client: Arc<dyn SearchEngineClient>,
        repository: Arc<dyn ReindexingRepository>,
        control: Arc<IndexingControl>,
        migrations: Arc<dyn MigrationTracker>,
        layout: IndexLayout,
        config: ReindexingConfig,
    ) -> Self {
        Self {
            client,
            repository,
            control,
            migrations,
            layout,
            config,
        }
    }

    /// Start a new reindexing task.
    ///
    /// Refused while another task is still in flight.
    #[instrument(skip(self))]
    pub async fn create_task(
        &self,
        task: NewReindexingTask,
    ) -> Result<ReindexingTask, ReindexingError> {
        if let Some(current) = self.repository.current_task().await? {
            return Err(ReindexingError::TaskInProgress(current.id));
        }
        let task = self.repository.create_task(task).await?;
        info!(task_id = task.id, "Reindexing task created");
        Ok(task)
    }

    /// The task in flight, if any.
    pub async fn current_task(&self) -> Result<Option<ReindexingTask>, ReindexingError> {
        Ok(self.repository.current_task().await?)
    }

    /// Run one step of the current task.
    ///
    /// # Returns
    ///
    /// The state the task is in afterwards, or `None` when there is no task.
    #[instrument(skip(self))]
    pub async fn execute(&self) -> Result<Option<ReindexingState>, ReindexingError> {
        let Some(task) = self.repository.current_task().await? else {
            debug!("No reindexing task in progress");
            return Ok(None);
        };

        debug!(task_id = task.id, state = %task.state, "Running reindexing step");
        let state = match task.state {
            ReindexingState::Initial => self.step_initial(&task).await?,
            ReindexingState::IndexingPaused => self.step_indexing_paused(&task).await?,
            ReindexingState::Reindexing => self.step_reindexing(&task).await?,
            ReindexingState::Success | ReindexingState::Failure => task.state,
        };

        Ok(Some(state))
    }

    /// Delete original indices whose grace period is over.
    ///
    /// # Returns
    ///
    /// The number of indices deleted.
    #[instrument(skip(self))]
    pub async fn drop_old_indices(&self) -> Result<usize, ReindexingError> {
        let mut dropped = 0;
        for task in self
            .repository
            .tasks_with_indices_to_delete(Utc::now())
            .await?
        {
            for subtask in self.repository.subtasks(task.id).await? {
                self.client.delete_index(&subtask.index_name_from).await?;
                info!(
                    task_id = task.id,
                    index = %subtask.index_name_from,
                    "Deleted original index"
                );
                dropped += 1;
            }
            self.repository
                .set_delete_original_index_at(task.id, None)
                .await?;
        }
        Ok(dropped)
    }

    async fn step_initial(&self, task: &ReindexingTask) -> Result<ReindexingState, ReindexingError> {
        if !self.client.alias_exists(&self.layout.main_alias).await? {
            return self.fail(task, ALIASES_REQUIRED).await;
        }

        if self.migrations.has_pending_migrations().await? {
            return self.fail(task, PENDING_MIGRATIONS).await;
        }

        let mut index_size = 0;
        for alias in self.layout.all_aliases() {
            index_size += self.client.index_size_bytes(&alias).await?;
        }
        let required = index_size * STORAGE_MARGIN;
        let free = self.client.cluster_free_size_bytes().await?;
        if free < required {
            let message = format!(
                "You should have at least {} bytes of storage available to perform reindexing. Please increase the storage in your cluster before reindexing.",
                required
            );
            return self.fail(task, &message).await;
        }

        self.control.pause().await?;
        let task = self
            .repository
            .transition(task.id, ReindexingState::IndexingPaused, None)
            .await?;
        info!(task_id = task.id, index_size, free, "Indexing paused for reindexing");
        Ok(task.state)
    }

    async fn step_indexing_paused(
        &self,
        task: &ReindexingTask,
    ) -> Result<ReindexingState, ReindexingError> {
        let existing = self.repository.subtasks(task.id).await?;

        for alias in self.layout.all_aliases() {
            if existing.iter().any(|s| s.alias_name == alias) {
                continue;
            }

            let from = self.client.get_alias_index(&alias).await?;
            // Named after the task, so a re-run after a crash finds the same index.
            let to = target_index_name(&alias, task.id, task.created_at);
            let settings = self.client.get_settings(&from).await?;
            let mappings = self.client.get_mappings(&from).await?;
            match self
                .client
                .create_index(&to, &bulk_load_index_body(&settings, &mappings))
                .await
            {
                Ok(()) => {}
                Err(SearchIndexError::IndexAlreadyExists(_)) => {
                    info!(task_id = task.id, index = %to, "Reusing target index from an earlier attempt");
                }
                Err(e) => return Err(e.into()),
            }

            let documents_count = self.client.documents_count(&from).await?;
            let max_slice = (settings.number_of_shards * task.slice_multiplier).max(1);
            let subtask = self
                .repository
                .create_subtask(
                    task.id,
                    NewReindexingSubtask {
                        alias_name: alias.clone(),
                        index_name_from: from,
                        index_name_to: to,
                        documents_count,
                    },
                    max_slice,
                )
                .await?;
            info!(
                task_id = task.id,
                alias = %alias,
                from = %subtask.index_name_from,
                to = %subtask.index_name_to,
                documents_count,
                max_slice,
                "Created reindexing subtask"
            );
        }

        let state = self
            .repository
            .transition(task.id, ReindexingState::Reindexing, None)
            .await?
            .state;

        for subtask in self.repository.subtasks(task.id).await? {
            self.dispatch_slices(task, &subtask).await?;
        }

        Ok(state)
    }

    async fn step_reindexing(
        &self,
        task: &ReindexingTask,
    ) -> Result<ReindexingState, ReindexingError> {
        let subtasks = self.repository.subtasks(task.id).await?;

        for subtask in &subtasks {
            let slices = self.repository.slices(subtask.id).await?;
            for slice in slices.iter().filter(|s| s.is_running()) {
                match self.check_slice(slice).await {
                    SliceCheck::Pending => {}
                    SliceCheck::Done => {
                        self.repository.mark_slice_completed(slice.id).await?;
                        debug!(
                            subtask_id = subtask.id,
                            slice = slice.elastic_slice,
                            "Slice completed"
                        );
                    }
                    SliceCheck::Failed(message) => {
                        if slice.retry_attempt >= self.config.max_retry_attempts {
                            return self.fail(task, &message).await;
                        }
                        warn!(
                            subtask_id = subtask.id,
                            slice = slice.elastic_slice,
                            retry_attempt = slice.retry_attempt + 1,
                            reason = %message,
                            "Retrying slice"
                        );
                        self.start_slice(subtask, slice, slice.retry_attempt + 1)
                            .await?;
                    }
                }
            }
            self.dispatch_slices(task, subtask).await?;
        }

        for subtask in &subtasks {
            let slices = self.repository.slices(subtask.id).await?;
            if !slices.iter().all(|s| s.completed) {
                return Ok(task.state);
            }
        }

        self.finish(task, &subtasks).await
    }

    /// Verify, restore settings, switch aliases and unpause.
    async fn finish(
        &self,
        task: &ReindexingTask,
        subtasks: &[ReindexingSubtask],
    ) -> Result<ReindexingState, ReindexingError> {
        for subtask in subtasks {
            self.client.refresh_index(&subtask.index_name_to).await?;
            let count = self.client.documents_count(&subtask.index_name_to).await?;
            self.repository
                .set_documents_count_target(subtask.id, count)
                .await?;
            if count != subtask.documents_count {
                let message = format!(
                    "Documents count is different, Count from new index: {} Count from original index: {}. This likely means something went wrong during reindexing.",
                    count, subtask.documents_count
                );
                return self.fail(task, &message).await;
            }
        }

        for subtask in subtasks {
            if self.client.get_alias_index(&subtask.alias_name).await? == subtask.index_name_to {
                debug!(alias = %subtask.alias_name, "Alias already switched");
                continue;
            }
            let settings = self.client.get_settings(&subtask.index_name_from).await?;
            self.client
                .update_settings(&subtask.index_name_to, &steady_state_settings(&settings))
                .await?;
            self.client
                .switch_alias(&AliasSwitch {
                    from: subtask.index_name_from.clone(),
                    to: subtask.index_name_to.clone(),
                    alias_name: subtask.alias_name.clone(),
                })
                .await?;
            info!(
                alias = %subtask.alias_name,
                from = %subtask.index_name_from,
                to = %subtask.index_name_to,
                "Switched alias"
            );
        }

        self.control.unpause().await?;
        self.repository
            .set_delete_original_index_at(
                task.id,
                Some(Utc::now() + self.config.delete_original_index_after),
            )
            .await?;
        let task = self
            .repository
            .transition(task.id, ReindexingState::Success, None)
            .await?;
        info!(task_id = task.id, "Reindexing finished");
        Ok(task.state)
    }

    async fn check_slice(&self, slice: &ReindexingSlice) -> SliceCheck {
        let Some(handle) = slice.elastic_task.as_deref() else {
            return SliceCheck::Pending;
        };

        match self.client.task_status(handle).await {
            Err(e) => {
                warn!(task = handle, error = %e, "Couldn't load slice task status");
                SliceCheck::Failed(format!("Couldn't load task status for {}", handle))
            }
            Ok(status) if !status.completed => SliceCheck::Pending,
            Ok(status) => match status.error {
                Some(error) => {
                    warn!(task = handle, error = %error, "Slice task failed");
                    SliceCheck::Failed(format!(
                        "Task {} has failed with an engine error",
                        handle
                    ))
                }
                None if !status.counts.is_consistent() => {
                    warn!(task = handle, counts = ?status.counts, "Slice task counts mismatch");
                    SliceCheck::Failed(format!(
                        "Task {} has failed with a documents count mismatch",
                        handle
                    ))
                }
                None => SliceCheck::Done,
            },
        }
    }

    /// Start not-yet-started slices in order while fewer than
    /// `max_slices_running` are in flight.
    async fn dispatch_slices(
        &self,
        task: &ReindexingTask,
        subtask: &ReindexingSubtask,
    ) -> Result<(), ReindexingError> {
        let slices = self.repository.slices(subtask.id).await?;
        let mut running = slices.iter().filter(|s| s.is_running()).count() as i32;

        for slice in slices.iter().filter(|s| !s.is_started()) {
            if running >= task.max_slices_running {
                break;
            }
            self.start_slice(subtask, slice, slice.retry_attempt).await?;
            running += 1;
        }
        Ok(())
    }

    async fn start_slice(
        &self,
        subtask: &ReindexingSubtask,
        slice: &ReindexingSlice,
        retry_attempt: i32,
    ) -> Result<(), ReindexingError> {
        let handle = self
            .client
            .reindex(
                &subtask.index_name_from,
                &subtask.index_name_to,
                slice.elastic_slice,
                slice.elastic_max_slice,
            )
            .await?;
        self.repository
            .set_slice_task(slice.id, &handle, retry_attempt)
            .await?;
        debug!(
            subtask_id = subtask.id,
            slice = slice.elastic_slice,
            task = %handle,
            retry_attempt,
            "Dispatched slice"
        );
        Ok(())
    }

    /// Move the task to `failure`, unpausing indexing if this task paused it.
    async fn fail(
        &self,
        task: &ReindexingTask,
        message: &str,
    ) -> Result<ReindexingState, ReindexingError> {
        warn!(task_id = task.id, state = %task.state, reason = message, "Reindexing failed");
        if task.state != ReindexingState::Initial {
            self.control.unpause().await?;
        }
        let task = self
            .repository
            .transition(task.id, ReindexingState::Failure, Some(message.to_string()))
            .await?;
        Ok(task.state)
    }
}
