//! Search index error types.
//!
//! This module defines the unified error type for all search engine
//! operations, from transport failures to unexpected response shapes.

use thiserror::Error;

/// Unified errors from search engine operations.
///
/// Used by the `SearchEngineClient` trait and everything built on top of it.
/// The variants mirror the engine APIs the sync subsystem calls so that log
/// lines and persisted error messages say which call went wrong.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Validation error (e.g., empty index name, malformed alias).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to establish connection to the search engine.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The bulk request as a whole failed.
    #[error("Bulk request error: {0}")]
    BulkRequestError(String),

    /// Failed to start a reindex task.
    #[error("Reindex error: {0}")]
    ReindexError(String),

    /// Failed to load the status of an engine task.
    #[error("Task status error: {0}")]
    TaskStatusError(String),

    /// The engine does not know the task.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Failed to read or write index settings or mappings.
    #[error("Settings error: {0}")]
    SettingsError(String),

    /// Failed to read or change an alias.
    #[error("Alias error: {0}")]
    AliasError(String),

    /// Failed to create an index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// The index to create is already there.
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// Failed to delete an index.
    #[error("Index deletion error: {0}")]
    IndexDeletionError(String),

    /// Failed to read index or cluster statistics.
    #[error("Stats error: {0}")]
    StatsError(String),

    /// Failed to parse response from the search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the search engine.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a bulk request error.
    pub fn bulk_request(msg: impl Into<String>) -> Self {
        Self::BulkRequestError(msg.into())
    }

    /// Create a reindex error.
    pub fn reindex(msg: impl Into<String>) -> Self {
        Self::ReindexError(msg.into())
    }

    /// Create a task status error.
    pub fn task_status(msg: impl Into<String>) -> Self {
        Self::TaskStatusError(msg.into())
    }

    /// Create a task not found error.
    pub fn task_not_found(task_id: &str) -> Self {
        Self::TaskNotFound(task_id.to_string())
    }

    /// Create a settings error.
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::SettingsError(msg.into())
    }

    /// Create an alias error.
    pub fn alias(msg: impl Into<String>) -> Self {
        Self::AliasError(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create an index already exists error.
    pub fn index_already_exists(index_name: &str) -> Self {
        Self::IndexAlreadyExists(index_name.to_string())
    }

    /// Create an index deletion error.
    pub fn index_deletion(msg: impl Into<String>) -> Self {
        Self::IndexDeletionError(msg.into())
    }

    /// Create a stats error.
    pub fn stats(msg: impl Into<String>) -> Self {
        Self::StatsError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }
}
