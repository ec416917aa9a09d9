//! Dependency initialization and wiring for the search sync service.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::SyncConfig;
use crate::bulk_indexer::BulkIndexerConfig;
use crate::indexing_control::{IndexingControl, PauseAwareProducer, TrackingProducer};
use crate::reindexing::{ClusterReindexingService, ReindexingConfig};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::tracking_queue::{TrackingQueue, TrackingQueueConfig};
use crate::SyncError;
use search_sync_repository::{
    run_migrations, ControlState, InMemoryControlState, InMemoryQueueStore, InMemoryRecordStore,
    InMemoryReindexingRepository, MigrationTracker, OpenSearchClient, PostgresControlState,
    PostgresMigrationTracker, PostgresQueueStore, PostgresRecordStore,
    PostgresReindexingRepository, QueueStore, RecordStore, ReindexingRepository,
    SearchEngineClient, StaticMigrationTracker,
};

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection until successful.
    Retry,
}

impl ConnectionMode {
    /// Parse the connection mode.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive)
    /// Defaults to "retry" if not set or invalid.
    pub(crate) fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// The durable stores, either all PostgreSQL or all in memory.
struct Stores {
    queue: Arc<dyn QueueStore>,
    control_state: Arc<dyn ControlState>,
    reindexing: Arc<dyn ReindexingRepository>,
    records: Arc<dyn RecordStore>,
    migrations: Arc<dyn MigrationTracker>,
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured scheduler ready to run.
    pub scheduler: Scheduler,
    pub control: Arc<IndexingControl>,
    pub tracking_queue: Arc<TrackingQueue>,
    pub reindexing: Arc<ClusterReindexingService>,
    /// Entry point for application writes: tracks references, or parks
    /// them while indexing is paused.
    pub producer: Arc<PauseAwareProducer<TrackingProducer>>,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`SyncConfig::from_env`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(SyncError)` - If initialization fails (OpenSearch only in fail-fast mode)
    pub async fn new() -> Result<Self, SyncError> {
        let config = SyncConfig::from_env()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: SyncConfig) -> Result<Self, SyncError> {
        info!(
            opensearch_url = %config.opensearch_url,
            database = config.database_url.is_some(),
            main_alias = %config.layout.main_alias,
            connection_mode = ?config.connection_mode,
            retry_interval_secs = config.retry_interval.as_secs(),
            "Initializing dependencies"
        );

        let client: Arc<dyn SearchEngineClient> = Arc::new(
            Self::connect_to_opensearch(
                &config.opensearch_url,
                config.connection_mode,
                config.retry_interval,
            )
            .await?,
        );
        info!("OpenSearch client ready");

        let stores = match &config.database_url {
            Some(url) => Self::postgres_stores(url).await?,
            None => {
                warn!("DATABASE_URL not set, using in-memory stores");
                Self::in_memory_stores()
            }
        };

        Ok(Self::wire(config, client, stores))
    }

    fn wire(config: SyncConfig, client: Arc<dyn SearchEngineClient>, stores: Stores) -> Self {
        let tracking_queue = Arc::new(
            TrackingQueue::with_config(
                Arc::clone(&stores.queue),
                stores.records,
                Arc::clone(&client),
                config.layout.clone(),
                TrackingQueueConfig {
                    shard_limit: config.shard_limit,
                    bulk: BulkIndexerConfig::from_megabytes(config.max_bulk_size_mb),
                },
            )
            .with_control_state(Arc::clone(&stores.control_state)),
        );

        let direct = Arc::new(TrackingProducer::new(Arc::clone(&tracking_queue)));
        let control = Arc::new(
            IndexingControl::new(
                stores.queue,
                stores.control_state,
                config.pause_cache_ttl,
            )
            .with_producer(direct.clone()),
        );
        let producer = Arc::new(PauseAwareProducer::new(direct, Arc::clone(&control)));

        let reindexing = Arc::new(ClusterReindexingService::with_config(
            client,
            stores.reindexing,
            Arc::clone(&control),
            stores.migrations,
            config.layout,
            ReindexingConfig {
                max_retry_attempts: config.reindex_max_retries,
                delete_original_index_after: chrono::Duration::days(
                    config.delete_original_index_after_days,
                ),
            },
        ));

        let scheduler = Scheduler::new(
            Arc::clone(&control),
            Arc::clone(&tracking_queue),
            Arc::clone(&reindexing),
            SchedulerConfig {
                tick_interval: config.tick_interval,
            },
        );

        Self {
            scheduler,
            control,
            tracking_queue,
            reindexing,
            producer,
        }
    }

    async fn postgres_stores(url: &str) -> Result<Stores, SyncError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| SyncError::config(format!("Failed to connect to PostgreSQL: {}", e)))?;
        run_migrations(&pool).await?;
        info!("PostgreSQL stores ready");

        Ok(Stores {
            queue: Arc::new(PostgresQueueStore::new(pool.clone())),
            control_state: Arc::new(PostgresControlState::new(pool.clone())),
            reindexing: Arc::new(PostgresReindexingRepository::new(pool.clone())),
            records: Arc::new(PostgresRecordStore::new(pool.clone())),
            migrations: Arc::new(PostgresMigrationTracker::new(pool)),
        })
    }

    fn in_memory_stores() -> Stores {
        Stores {
            queue: Arc::new(InMemoryQueueStore::new()),
            control_state: Arc::new(InMemoryControlState::new(false)),
            reindexing: Arc::new(InMemoryReindexingRepository::new()),
            records: Arc::new(InMemoryRecordStore::new()),
            migrations: Arc::new(StaticMigrationTracker::default()),
        }
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchClient, SyncError> {
        loop {
            match Self::try_connect_opensearch(url).await {
                Ok(client) => return Ok(client),
                Err(e) => match mode {
                    ConnectionMode::FailFast => return Err(e),
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Create the client and make sure the cluster answers.
    async fn try_connect_opensearch(url: &str) -> Result<OpenSearchClient, SyncError> {
        let client = OpenSearchClient::new(url)
            .await
            .map_err(|e| SyncError::config(format!("Failed to create OpenSearch client: {}", e)))?;
        client
            .cluster_free_size_bytes()
            .await
            .map_err(|e| SyncError::config(format!("Failed to reach OpenSearch: {}", e)))?;
        Ok(client)
    }
}
