//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use search_sync::indexing_control::{IndexingControl, PauseAwareProducer, TrackingProducer};
use search_sync::reindexing::{ClusterReindexingService, ReindexingConfig};
use search_sync::tracking_queue::{TrackingQueue, TrackingQueueConfig};
use search_sync_repository::{
    AliasSwitch, BulkItemResult, BulkOperation, BulkResponse, InMemoryControlState,
    InMemoryQueueStore, InMemoryRecordStore, InMemoryReindexingRepository, IndexLayout,
    IndexSettings, ReindexCounts, SearchEngineClient, SearchIndexError, StaticMigrationTracker,
    TaskStatus,
};
use search_sync_shared::{DocumentReference, ReindexingState, SourceType};

/// What the next `task_status` call reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedStatus {
    Running,
    Done,
    EngineError,
    CountMismatch,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexCall {
    pub from: String,
    pub to: String,
    pub slice: i32,
    pub max_slice: i32,
    pub task: String,
}

#[derive(Default)]
pub struct EngineState {
    /// Documents by concrete index, then by id.
    pub documents: BTreeMap<String, BTreeMap<String, Value>>,
    pub aliases: BTreeMap<String, String>,
    pub settings: BTreeMap<String, IndexSettings>,
    pub created_indices: Vec<(String, Value)>,
    pub settings_updates: Vec<(String, Value)>,
    pub deleted_indices: Vec<String>,
    pub bulk_requests: Vec<Vec<BulkOperation>>,
    pub reindex_calls: Vec<ReindexCall>,
    pub status_polls: Vec<String>,
    pub status_script: VecDeque<ScriptedStatus>,
    /// Reported for every poll once the script is exhausted.
    pub default_status: Option<ScriptedStatus>,
    pub count_overrides: HashMap<String, i64>,
    pub index_size_bytes: u64,
    pub free_bytes: u64,
    pub fail_bulk: bool,
    pub reject_ids: HashSet<String>,
    /// Aliases whose next switch fails.
    pub fail_switch_once: HashSet<String>,
}

/// In-memory search engine.
pub struct FakeEngine {
    pub state: Mutex<EngineState>,
}

impl FakeEngine {
    /// An engine where every alias in `aliases` points at `<alias>-v1`.
    pub fn with_aliases(aliases: &[&str]) -> Arc<Self> {
        let mut state = EngineState {
            index_size_bytes: 1_000,
            free_bytes: 1_000_000,
            ..Default::default()
        };
        for alias in aliases {
            let index = format!("{}-v1", alias);
            state.aliases.insert(alias.to_string(), index.clone());
            state.documents.insert(index, BTreeMap::new());
        }
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    fn resolve(state: &EngineState, name: &str) -> String {
        state
            .aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Put `count` documents into the index behind `alias`.
    pub async fn seed(&self, alias: &str, count: usize) {
        let mut state = self.state.lock().await;
        let index = Self::resolve(&state, alias);
        let docs = state.documents.entry(index).or_default();
        for n in 0..count {
            docs.insert(format!("doc_{}", n), json!({"n": n}));
        }
    }

    pub async fn document(&self, alias: &str, id: &str) -> Option<Value> {
        let state = self.state.lock().await;
        let index = Self::resolve(&state, alias);
        state.documents.get(&index).and_then(|d| d.get(id)).cloned()
    }

    pub async fn alias_target(&self, alias: &str) -> Option<String> {
        self.state.lock().await.aliases.get(alias).cloned()
    }

    pub async fn script(&self, statuses: &[ScriptedStatus]) {
        self.state.lock().await.status_script.extend(statuses);
    }
}

#[async_trait]
impl SearchEngineClient for FakeEngine {
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, SearchIndexError> {
        let mut state = self.state.lock().await;
        state.bulk_requests.push(operations.to_vec());
        if state.fail_bulk {
            return Err(SearchIndexError::bulk_request("connection refused"));
        }

        let mut items = Vec::new();
        for operation in operations {
            if state.reject_ids.contains(operation.id()) {
                items.push(BulkItemResult::failed(429, "es_rejected_execution_exception"));
                continue;
            }
            match operation {
                BulkOperation::Index {
                    index,
                    id,
                    document,
                    ..
                } => {
                    let index = Self::resolve(&state, index);
                    state
                        .documents
                        .entry(index)
                        .or_default()
                        .insert(id.clone(), document.clone());
                    items.push(BulkItemResult::ok(201));
                }
                BulkOperation::Delete { index, id, .. } => {
                    let index = Self::resolve(&state, index);
                    let removed = state
                        .documents
                        .get_mut(&index)
                        .and_then(|docs| docs.remove(id));
                    items.push(BulkItemResult::ok(if removed.is_some() { 200 } else { 404 }));
                }
            }
        }

        Ok(BulkResponse {
            errors: items.iter().any(BulkItemResult::is_error),
            items,
        })
    }

    async fn reindex(
        &self,
        from: &str,
        to: &str,
        slice: i32,
        max_slice: i32,
    ) -> Result<String, SearchIndexError> {
        let mut state = self.state.lock().await;
        let task = format!("node:{}", state.reindex_calls.len() + 1);
        let copied = state.documents.get(from).cloned().unwrap_or_default();
        state
            .documents
            .entry(to.to_string())
            .or_default()
            .extend(copied);
        state.reindex_calls.push(ReindexCall {
            from: from.to_string(),
            to: to.to_string(),
            slice,
            max_slice,
            task: task.clone(),
        });
        Ok(task)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, SearchIndexError> {
        let mut state = self.state.lock().await;
        state.status_polls.push(task_id.to_string());
        let scripted = state
            .status_script
            .pop_front()
            .or(state.default_status)
            .unwrap_or(ScriptedStatus::Done);

        let consistent = ReindexCounts {
            total: 10,
            created: 10,
            updated: 0,
            deleted: 0,
        };
        match scripted {
            ScriptedStatus::Running => Ok(TaskStatus {
                completed: false,
                counts: ReindexCounts::default(),
                error: None,
            }),
            ScriptedStatus::Done => Ok(TaskStatus {
                completed: true,
                counts: consistent,
                error: None,
            }),
            ScriptedStatus::EngineError => Ok(TaskStatus {
                completed: true,
                counts: consistent,
                error: Some("search_phase_execution_exception".to_string()),
            }),
            ScriptedStatus::CountMismatch => Ok(TaskStatus {
                completed: true,
                counts: ReindexCounts {
                    created: 7,
                    ..consistent
                },
                error: None,
            }),
            ScriptedStatus::NotFound => Err(SearchIndexError::task_not_found(task_id)),
        }
    }

    async fn get_settings(&self, index_name: &str) -> Result<IndexSettings, SearchIndexError> {
        let state = self.state.lock().await;
        Ok(state
            .settings
            .get(index_name)
            .cloned()
            .unwrap_or(IndexSettings {
                number_of_shards: 1,
                number_of_replicas: 1,
                refresh_interval: Some("30s".to_string()),
            }))
    }

    async fn get_mappings(&self, _index_name: &str) -> Result<Value, SearchIndexError> {
        Ok(json!({"properties": {"title": {"type": "text"}}}))
    }

    async fn update_settings(
        &self,
        index_name: &str,
        settings: &Value,
    ) -> Result<(), SearchIndexError> {
        self.state
            .lock()
            .await
            .settings_updates
            .push((index_name.to_string(), settings.clone()));
        Ok(())
    }

    async fn create_index(&self, index_name: &str, body: &Value) -> Result<(), SearchIndexError> {
        let mut state = self.state.lock().await;
        if state.documents.contains_key(index_name) {
            return Err(SearchIndexError::index_already_exists(index_name));
        }
        state
            .documents
            .insert(index_name.to_string(), BTreeMap::new());
        state
            .created_indices
            .push((index_name.to_string(), body.clone()));
        Ok(())
    }

    async fn delete_index(&self, index_name: &str) -> Result<(), SearchIndexError> {
        let mut state = self.state.lock().await;
        state.documents.remove(index_name);
        state.deleted_indices.push(index_name.to_string());
        Ok(())
    }

    async fn refresh_index(&self, _index_name: &str) -> Result<(), SearchIndexError> {
        Ok(())
    }

    async fn documents_count(&self, index_name: &str) -> Result<i64, SearchIndexError> {
        let state = self.state.lock().await;
        let index = Self::resolve(&state, index_name);
        if let Some(count) = state.count_overrides.get(&index) {
            return Ok(*count);
        }
        Ok(state.documents.get(&index).map(|d| d.len()).unwrap_or(0) as i64)
    }

    async fn alias_exists(&self, name: &str) -> Result<bool, SearchIndexError> {
        Ok(self.state.lock().await.aliases.contains_key(name))
    }

    async fn get_alias_index(&self, alias_name: &str) -> Result<String, SearchIndexError> {
        self.state
            .lock()
            .await
            .aliases
            .get(alias_name)
            .cloned()
            .ok_or_else(|| SearchIndexError::alias(format!("alias {} not found", alias_name)))
    }

    async fn switch_alias(&self, switch: &AliasSwitch) -> Result<(), SearchIndexError> {
        let mut state = self.state.lock().await;
        if state.fail_switch_once.remove(&switch.alias_name) {
            return Err(SearchIndexError::alias("connection reset"));
        }
        // Like `_aliases`, removing an alias from an index it is not on fails.
        if state.aliases.get(&switch.alias_name) != Some(&switch.from) {
            return Err(SearchIndexError::alias(format!(
                "aliases_not_found_exception: {} on {}",
                switch.alias_name, switch.from
            )));
        }
        state
            .aliases
            .insert(switch.alias_name.clone(), switch.to.clone());
        Ok(())
    }

    async fn index_size_bytes(&self, _index_name: &str) -> Result<u64, SearchIndexError> {
        Ok(self.state.lock().await.index_size_bytes)
    }

    async fn cluster_free_size_bytes(&self) -> Result<u64, SearchIndexError> {
        Ok(self.state.lock().await.free_bytes)
    }
}

/// Every component wired against the fake engine and in-memory stores.
pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub queue_store: Arc<InMemoryQueueStore>,
    pub records: Arc<InMemoryRecordStore>,
    pub control_state: Arc<InMemoryControlState>,
    pub repository: Arc<InMemoryReindexingRepository>,
    pub tracking_queue: Arc<TrackingQueue>,
    pub control: Arc<IndexingControl>,
    pub producer: PauseAwareProducer<TrackingProducer>,
    pub reindexing: Arc<ClusterReindexingService>,
}

pub struct HarnessOptions {
    pub layout: IndexLayout,
    pub queue: TrackingQueueConfig,
    pub reindexing: ReindexingConfig,
    pub pending_migrations: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            layout: IndexLayout::new("search-sync"),
            queue: TrackingQueueConfig::default(),
            reindexing: ReindexingConfig::default(),
            pending_migrations: false,
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let aliases = options.layout.all_aliases();
        let alias_refs: Vec<&str> = aliases.iter().map(String::as_str).collect();
        let engine = FakeEngine::with_aliases(&alias_refs);
        let queue_store = Arc::new(InMemoryQueueStore::new());
        let records = Arc::new(InMemoryRecordStore::new());
        let control_state = Arc::new(InMemoryControlState::new(false));
        let repository = Arc::new(InMemoryReindexingRepository::new());

        let tracking_queue = Arc::new(
            TrackingQueue::with_config(
                queue_store.clone(),
                records.clone(),
                engine.clone(),
                options.layout.clone(),
                options.queue,
            )
            .with_control_state(control_state.clone()),
        );
        let direct = Arc::new(TrackingProducer::new(tracking_queue.clone()));
        let control = Arc::new(
            IndexingControl::new(queue_store.clone(), control_state.clone(), Duration::ZERO)
                .with_producer(direct.clone()),
        );
        let producer = PauseAwareProducer::new(direct, control.clone());
        let reindexing = Arc::new(ClusterReindexingService::with_config(
            engine.clone(),
            repository.clone(),
            control.clone(),
            Arc::new(StaticMigrationTracker {
                pending: options.pending_migrations,
            }),
            options.layout,
            options.reindexing,
        ));

        Self {
            engine,
            queue_store,
            records,
            control_state,
            repository,
            tracking_queue,
            control,
            producer,
            reindexing,
        }
    }
}

pub fn issue_ref(id: i64) -> DocumentReference {
    DocumentReference::new(
        SourceType::Issue,
        id,
        format!("issue_{}", id),
        Some("project_1".to_string()),
    )
}

/// Issue references with ids from `start` that all hash to the same shard.
pub fn same_shard_issues(start: i64, count: usize, shards: usize) -> Vec<DocumentReference> {
    let shard = issue_ref(start).shard(shards);
    (start..)
        .map(issue_ref)
        .filter(|r| r.shard(shards) == shard)
        .take(count)
        .collect()
}

/// Run reindexing steps until the task is finished, returning every state seen.
pub async fn run_to_completion(harness: &Harness, max_ticks: usize) -> Vec<ReindexingState> {
    let mut states = Vec::new();
    for _ in 0..max_ticks {
        match harness.reindexing.execute().await.unwrap() {
            Some(state) => {
                states.push(state);
                if state.is_terminal() {
                    break;
                }
            }
            None => break,
        }
    }
    states
}
