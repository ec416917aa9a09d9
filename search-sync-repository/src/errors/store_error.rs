//! Errors raised by the durable stores (queues, task state, settings).

use search_sync_shared::ReindexingState;
use thiserror::Error;

/// Represents errors that can occur within the durable stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ReindexingState,
        to: ReindexingState,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn corrupt_row(msg: impl Into<String>) -> Self {
        Self::CorruptRow(msg.into())
    }
}
