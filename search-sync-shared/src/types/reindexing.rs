//! Cluster reindexing task types.
//!
//! A reindexing task migrates every index to a new generation. It owns one
//! subtask per alias being migrated, and each subtask owns the slices that
//! the copy is split into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of a reindexing task.
///
/// Transitions only move forward (`Initial → IndexingPaused → Reindexing →
/// Success`) except that any non-terminal state may move to `Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexingState {
    Initial,
    IndexingPaused,
    Reindexing,
    Success,
    Failure,
}

impl ReindexingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReindexingState::Initial => "initial",
            ReindexingState::IndexingPaused => "indexing_paused",
            ReindexingState::Reindexing => "reindexing",
            ReindexingState::Success => "success",
            ReindexingState::Failure => "failure",
        }
    }

    /// Whether the task is finished for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReindexingState::Success | ReindexingState::Failure)
    }

    /// The only place that decides which state changes are legal.
    pub fn can_transition_to(&self, next: ReindexingState) -> bool {
        use ReindexingState::*;
        match (self, next) {
            (Initial, IndexingPaused) => true,
            (IndexingPaused, Reindexing) => true,
            (Reindexing, Success) => true,
            (from, Failure) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ReindexingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReindexingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(ReindexingState::Initial),
            "indexing_paused" => Ok(ReindexingState::IndexingPaused),
            "reindexing" => Ok(ReindexingState::Reindexing),
            "success" => Ok(ReindexingState::Success),
            "failure" => Ok(ReindexingState::Failure),
            other => Err(format!("unknown reindexing state '{}'", other)),
        }
    }
}

/// A persisted reindexing task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexingTask {
    pub id: i64,
    pub state: ReindexingState,
    pub error_message: Option<String>,
    /// Upper bound of slices in flight per subtask.
    pub max_slices_running: i32,
    /// Slices per source shard.
    pub slice_multiplier: i32,
    /// When the previous index generation may be deleted.
    pub delete_original_index_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for a new reindexing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewReindexingTask {
    pub max_slices_running: i32,
    pub slice_multiplier: i32,
}

impl Default for NewReindexingTask {
    fn default() -> Self {
        Self {
            max_slices_running: 60,
            slice_multiplier: 2,
        }
    }
}

/// One alias being migrated by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexingSubtask {
    pub id: i64,
    pub task_id: i64,
    pub alias_name: String,
    pub index_name_from: String,
    pub index_name_to: String,
    /// Documents in the source index when the subtask was created.
    pub documents_count: i64,
    /// Documents found in the target index after the copy.
    pub documents_count_target: Option<i64>,
}

/// Values needed to insert a subtask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReindexingSubtask {
    pub alias_name: String,
    pub index_name_from: String,
    pub index_name_to: String,
    pub documents_count: i64,
}

/// One parallel portion of a subtask's copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexingSlice {
    pub id: i64,
    pub subtask_id: i64,
    pub elastic_slice: i32,
    pub elastic_max_slice: i32,
    /// Engine task handle; replaced on every retry.
    pub elastic_task: Option<String>,
    pub retry_attempt: i32,
    pub completed: bool,
}

impl ReindexingSlice {
    /// Dispatched and not yet verified.
    pub fn is_running(&self) -> bool {
        self.elastic_task.is_some() && !self.completed
    }

    pub fn is_started(&self) -> bool {
        self.elastic_task.is_some()
    }
}
