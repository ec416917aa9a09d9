//! # Search Sync
//!
//! Keeps a search index consistent with the primary datastore under
//! continuous writes, and migrates the whole index to a new generation
//! without downtime.
//!
//! ## Architecture
//!
//! 1. **References**: resolve queued document references to live records
//! 2. **Bulk Indexer**: ships index/delete operations in size-bounded batches
//! 3. **Tracking Queue**: durable, deduplicating, sharded queue of changes
//! 4. **Indexing Control**: pauses the pipeline and replays parked work
//! 5. **Reindexing**: persisted state machine for cluster reindexing
//! 6. **Scheduler**: invokes the above periodically
//!
//! ## Modules
//!
//! - [`config`]: Configuration and dependency initialization
//! - [`references`]: Batch resolution of document references
//! - [`bulk_indexer`]: Bulk request batching
//! - [`tracking_queue`]: The tracking queue and its consumer
//! - [`indexing_control`]: Pause flag, waiting queues and job producers
//! - [`reindexing`]: Cluster reindexing orchestrator
//! - [`scheduler`]: Tick loop
//! - [`errors`]: Error types

pub mod bulk_indexer;
pub mod config;
pub mod errors;
pub mod indexing_control;
pub mod references;
pub mod reindexing;
pub mod scheduler;
pub mod tracking_queue;

pub use config::{Dependencies, SyncConfig};
pub use errors::{IndexingControlError, ReindexingError, TrackingQueueError};

use search_sync_repository::StoreError;
use thiserror::Error;

/// Errors that can occur during service initialization.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Durable store error.
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
}

impl SyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
