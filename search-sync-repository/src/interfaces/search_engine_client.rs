//! Search engine client trait definition.
//!
//! This module defines the abstract interface the sync subsystem needs from
//! the search engine, allowing different backend implementations (OpenSearch,
//! Elasticsearch, test fakes).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{AliasSwitch, BulkOperation, BulkResponse, IndexSettings, TaskStatus};

/// Abstracts the underlying search engine.
///
/// Implementations are injected into the bulk indexer and the cluster
/// reindexing service. All methods return `Result<T, SearchIndexError>` for
/// consistent error handling across backends.
///
/// # Idempotency
///
/// Every document write goes through `bulk` with an explicit document id, so
/// resubmitting the same operation overwrites rather than duplicates.
#[async_trait]
pub trait SearchEngineClient: Send + Sync {
    /// Submit a batch of index/delete operations in one request.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkResponse)` - Per-item outcomes, in request order
    /// * `Err(SearchIndexError)` - If the request itself failed
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, SearchIndexError>;

    /// Start an asynchronous reindex of one slice of `from` into `to`.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The engine task handle
    async fn reindex(
        &self,
        from: &str,
        to: &str,
        slice: i32,
        max_slice: i32,
    ) -> Result<String, SearchIndexError>;

    /// Load the status of an engine task.
    ///
    /// Returns `SearchIndexError::TaskNotFound` when the engine does not know the task.
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, SearchIndexError>;

    /// Read the settings reindexing cares about.
    async fn get_settings(&self, index_name: &str) -> Result<IndexSettings, SearchIndexError>;

    /// Read the mappings of an index.
    async fn get_mappings(&self, index_name: &str) -> Result<Value, SearchIndexError>;

    /// Apply an index settings body (the `index` object of a settings update).
    async fn update_settings(
        &self,
        index_name: &str,
        settings: &Value,
    ) -> Result<(), SearchIndexError>;

    /// Create an index from a full `{settings, mappings}` body.
    ///
    /// Fails with `SearchIndexError::IndexAlreadyExists` when the name is taken.
    async fn create_index(&self, index_name: &str, body: &Value) -> Result<(), SearchIndexError>;

    /// Delete an index. Deleting a missing index is not an error.
    async fn delete_index(&self, index_name: &str) -> Result<(), SearchIndexError>;

    /// Make recent writes visible to searches and counts.
    async fn refresh_index(&self, index_name: &str) -> Result<(), SearchIndexError>;

    /// Number of documents in an index or alias.
    async fn documents_count(&self, index_name: &str) -> Result<i64, SearchIndexError>;

    /// Whether `name` exists as an alias (as opposed to a concrete index).
    async fn alias_exists(&self, name: &str) -> Result<bool, SearchIndexError>;

    /// The concrete index an alias currently points to.
    async fn get_alias_index(&self, alias_name: &str) -> Result<String, SearchIndexError>;

    /// Atomically move `alias_name` from one index to another.
    async fn switch_alias(&self, switch: &AliasSwitch) -> Result<(), SearchIndexError>;

    /// Storage used by an index or alias, in bytes.
    async fn index_size_bytes(&self, index_name: &str) -> Result<u64, SearchIndexError>;

    /// Free storage across the cluster, in bytes.
    async fn cluster_free_size_bytes(&self) -> Result<u64, SearchIndexError>;
}
