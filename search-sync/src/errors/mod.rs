//! Error types for the search sync subsystem.

use search_sync_repository::{SearchIndexError, StoreError};
use thiserror::Error;

/// Errors raised while tracking references or draining the tracking queue.
#[derive(Error, Debug)]
pub enum TrackingQueueError {
    /// The queue or record store failed.
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// The bulk request failed as a whole; nothing was removed from the queue.
    #[error("Flush error: {0}")]
    FlushError(SearchIndexError),
}

/// Errors raised by the indexing control valve and the job producers.
#[derive(Error, Debug)]
pub enum IndexingControlError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// A waiting queue entry could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A job whose arguments the producer cannot handle. Never retried.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// No direct producer is registered for a worker type.
    #[error("Unknown worker type: {0}")]
    UnknownWorker(String),

    #[error("Tracking queue error: {0}")]
    TrackingQueueError(#[from] TrackingQueueError),
}

impl IndexingControlError {
    /// Create an invalid job error.
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    /// Whether retrying the same job can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidJob(_) | Self::SerializationError(_))
    }
}

/// Errors raised by a reindexing step.
///
/// These are infrastructure failures; the step is retried on the next tick.
/// Precondition and slice failures are not errors, they move the task to
/// `failure` instead.
#[derive(Error, Debug)]
pub enum ReindexingError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Search engine error: {0}")]
    SearchEngineError(#[from] SearchIndexError),

    #[error("Indexing control error: {0}")]
    IndexingControlError(#[from] IndexingControlError),

    /// Another task has not reached a terminal state yet.
    #[error("Reindexing task {0} is still in progress")]
    TaskInProgress(i64),
}
