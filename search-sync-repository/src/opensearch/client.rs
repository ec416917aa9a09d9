//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchEngineClient`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterStatsParts,
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsAliasParts, IndicesGetAliasParts,
        IndicesGetMappingParts, IndicesGetSettingsParts, IndicesPutSettingsParts,
        IndicesRefreshParts, IndicesStatsParts,
    },
    tasks::TasksGetParts,
    BulkParts, CountParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchEngineClient;
use crate::types::{AliasSwitch, BulkOperation, BulkResponse, IndexSettings, TaskStatus};

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// let client = OpenSearchClient::new("http://localhost:9200").await?;
/// let count = client.documents_count("search-sync").await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, "Created OpenSearch client");

        Ok(Self { client })
    }

    /// Turn a non-success response into an error built by `make_error`.
    async fn ensure_success(
        response: Response,
        action: &str,
        make_error: fn(String) -> SearchIndexError,
    ) -> Result<Response, SearchIndexError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }
        let error_body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %error_body, action = action, "OpenSearch request failed");
        Err(make_error(format!(
            "{} failed with status {}: {}",
            action, status, error_body
        )))
    }

    async fn read_json(
        response: Response,
        make_error: fn(String) -> SearchIndexError,
    ) -> Result<Value, SearchIndexError> {
        response
            .json::<Value>()
            .await
            .map_err(|e| make_error(format!("Failed to read response body: {}", e)))
    }

    /// The first per-index object of a response keyed by concrete index name.
    fn first_index_entry<'a>(body: &'a Value, index_name: &str) -> Result<&'a Value, SearchIndexError> {
        body.as_object()
            .and_then(|indices| indices.values().next())
            .ok_or_else(|| SearchIndexError::parse(format!("No index found for '{}'", index_name)))
    }

    fn parse_i32(value: &Value) -> Option<i32> {
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse::<i64>().ok()))
            .map(|v| v as i32)
    }
}

#[async_trait]
impl SearchEngineClient for OpenSearchClient {
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, SearchIndexError> {
        let body: Vec<JsonBody<Value>> = operations
            .iter()
            .flat_map(BulkOperation::lines)
            .map(JsonBody::new)
            .collect();

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::bulk_request(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Bulk request", SearchIndexError::BulkRequestError)
                .await?;
        let body = Self::read_json(response, SearchIndexError::BulkRequestError).await?;

        let parsed = BulkResponse::from_json(&body);
        if parsed.items.len() != operations.len() {
            return Err(SearchIndexError::parse(format!(
                "Bulk response has {} items for {} operations",
                parsed.items.len(),
                operations.len()
            )));
        }

        debug!(
            operations = operations.len(),
            errors = parsed.errors,
            "Bulk request completed"
        );
        Ok(parsed)
    }

    async fn reindex(
        &self,
        from: &str,
        to: &str,
        slice: i32,
        max_slice: i32,
    ) -> Result<String, SearchIndexError> {
        let response = self
            .client
            .reindex()
            .wait_for_completion(false)
            .body(json!({
                "source": {
                    "index": from,
                    "slice": { "id": slice, "max": max_slice }
                },
                "dest": { "index": to }
            }))
            .send()
            .await
            .map_err(|e| SearchIndexError::reindex(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Reindex", SearchIndexError::ReindexError).await?;
        let body = Self::read_json(response, SearchIndexError::ReindexError).await?;

        let task_id = body["task"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SearchIndexError::parse(format!("Reindex response has no task: {}", body)))?;

        info!(from = %from, to = %to, slice, max_slice, task_id = %task_id, "Started reindex slice");
        Ok(task_id)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, SearchIndexError> {
        let response = self
            .client
            .tasks()
            .get(TasksGetParts::TaskId(task_id))
            .send()
            .await
            .map_err(|e| SearchIndexError::task_status(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::task_not_found(task_id));
        }
        let response =
            Self::ensure_success(response, "Task status", SearchIndexError::TaskStatusError)
                .await?;
        let body = Self::read_json(response, SearchIndexError::TaskStatusError).await?;

        Ok(TaskStatus::from_json(&body))
    }

    async fn get_settings(&self, index_name: &str) -> Result<IndexSettings, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_settings(IndicesGetSettingsParts::Index(&[index_name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::settings(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Get settings", SearchIndexError::SettingsError).await?;
        let body = Self::read_json(response, SearchIndexError::SettingsError).await?;

        let index = &Self::first_index_entry(&body, index_name)?["settings"]["index"];
        let number_of_shards = Self::parse_i32(&index["number_of_shards"]).ok_or_else(|| {
            SearchIndexError::parse(format!("No number_of_shards for '{}'", index_name))
        })?;

        Ok(IndexSettings {
            number_of_shards,
            number_of_replicas: Self::parse_i32(&index["number_of_replicas"]).unwrap_or(1),
            refresh_interval: index["refresh_interval"].as_str().map(str::to_string),
        })
    }

    async fn get_mappings(&self, index_name: &str) -> Result<Value, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_mapping(IndicesGetMappingParts::Index(&[index_name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::settings(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Get mappings", SearchIndexError::SettingsError).await?;
        let body = Self::read_json(response, SearchIndexError::SettingsError).await?;

        Ok(Self::first_index_entry(&body, index_name)?["mappings"].clone())
    }

    async fn update_settings(
        &self,
        index_name: &str,
        settings: &Value,
    ) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&[index_name]))
            .body(json!({ "index": settings }))
            .send()
            .await
            .map_err(|e| SearchIndexError::settings(e.to_string()))?;
        Self::ensure_success(response, "Update settings", SearchIndexError::SettingsError).await?;

        debug!(index = %index_name, "Index settings updated");
        Ok(())
    }

    async fn create_index(&self, index_name: &str, body: &Value) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index_name))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::index_creation(e.to_string()))?;

        if response.status_code().as_u16() == 400 {
            let error_body = response.text().await.unwrap_or_default();
            if error_body.contains("resource_already_exists_exception") {
                return Err(SearchIndexError::index_already_exists(index_name));
            }
            error!(body = %error_body, action = "Create index", "OpenSearch request failed");
            return Err(SearchIndexError::index_creation(format!(
                "Create index failed with status 400: {}",
                error_body
            )));
        }
        Self::ensure_success(response, "Create index", SearchIndexError::IndexCreationError)
            .await?;

        info!(index = %index_name, "Created index");
        Ok(())
    }

    async fn delete_index(&self, index_name: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index_name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::index_deletion(e.to_string()))?;

        // 404 is acceptable - the index may already be gone
        if response.status_code().as_u16() == 404 {
            debug!(index = %index_name, "Index already deleted");
            return Ok(());
        }
        Self::ensure_success(response, "Delete index", SearchIndexError::IndexDeletionError)
            .await?;

        info!(index = %index_name, "Deleted index");
        Ok(())
    }

    async fn refresh_index(&self, index_name: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index_name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::settings(e.to_string()))?;
        Self::ensure_success(response, "Refresh index", SearchIndexError::SettingsError).await?;
        Ok(())
    }

    async fn documents_count(&self, index_name: &str) -> Result<i64, SearchIndexError> {
        let response = self
            .client
            .count(CountParts::Index(&[index_name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::stats(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Count", SearchIndexError::StatsError).await?;
        let body = Self::read_json(response, SearchIndexError::StatsError).await?;

        body["count"]
            .as_i64()
            .ok_or_else(|| SearchIndexError::parse(format!("Count response has no count: {}", body)))
    }

    async fn alias_exists(&self, name: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::Name(&[name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SearchIndexError::alias(format!(
                "Alias lookup for '{}' returned status {}",
                name, status
            ))),
        }
    }

    async fn get_alias_index(&self, alias_name: &str) -> Result<String, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Name(&[alias_name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Get alias", SearchIndexError::AliasError).await?;
        let body = Self::read_json(response, SearchIndexError::AliasError).await?;

        let indices = body
            .as_object()
            .ok_or_else(|| SearchIndexError::parse(format!("Unexpected alias response: {}", body)))?;
        match indices.keys().collect::<Vec<_>>().as_slice() {
            [index] => Ok((*index).clone()),
            [] => Err(SearchIndexError::alias(format!(
                "Alias '{}' does not point to any index",
                alias_name
            ))),
            many => Err(SearchIndexError::alias(format!(
                "Alias '{}' points to {} indices",
                alias_name,
                many.len()
            ))),
        }
    }

    async fn switch_alias(&self, switch: &AliasSwitch) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .update_aliases()
            .body(json!({
                "actions": [
                    { "remove": { "index": switch.from, "alias": switch.alias_name } },
                    { "add": { "index": switch.to, "alias": switch.alias_name, "is_write_index": true } }
                ]
            }))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;
        Self::ensure_success(response, "Switch alias", SearchIndexError::AliasError).await?;

        info!(
            alias = %switch.alias_name,
            from = %switch.from,
            to = %switch.to,
            "Switched alias"
        );
        Ok(())
    }

    async fn index_size_bytes(&self, index_name: &str) -> Result<u64, SearchIndexError> {
        let response = self
            .client
            .indices()
            .stats(IndicesStatsParts::IndexMetric(&[index_name], &["store"]))
            .send()
            .await
            .map_err(|e| SearchIndexError::stats(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Index stats", SearchIndexError::StatsError).await?;
        let body = Self::read_json(response, SearchIndexError::StatsError).await?;

        body["_all"]["total"]["store"]["size_in_bytes"]
            .as_u64()
            .ok_or_else(|| SearchIndexError::parse(format!("No store size for '{}'", index_name)))
    }

    async fn cluster_free_size_bytes(&self) -> Result<u64, SearchIndexError> {
        let response = self
            .client
            .cluster()
            .stats(ClusterStatsParts::None)
            .send()
            .await
            .map_err(|e| SearchIndexError::stats(e.to_string()))?;
        let response =
            Self::ensure_success(response, "Cluster stats", SearchIndexError::StatsError).await?;
        let body = Self::read_json(response, SearchIndexError::StatsError).await?;

        body["nodes"]["fs"]["free_in_bytes"]
            .as_u64()
            .ok_or_else(|| SearchIndexError::parse("Cluster stats have no free_in_bytes"))
    }
}
