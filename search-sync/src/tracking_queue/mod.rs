//! Deduplicating, sharded queue of pending document references.
//!
//! Application writes `track` references; the scheduler calls `execute` to
//! drain a bounded slice of every shard into one bulk indexer run. Each shard
//! is a scored set, so tracking a reference that is already queued moves it
//! to the back of its shard instead of queueing it twice.

use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::bulk_indexer::{BulkIndexer, BulkIndexerConfig};
use crate::errors::TrackingQueueError;
use crate::references::ReferenceCollection;
use search_sync_repository::{
    ControlState, IndexLayout, QueueStore, RecordStore, ScoredMember, SearchEngineClient,
};
use search_sync_shared::{shard_number, DocumentReference};

/// Number of queue shards. Changing it re-homes every queued reference.
pub const SHARDS: usize = 16;

/// Default number of entries drained per shard and run.
pub const DEFAULT_SHARD_LIMIT: usize = 1000;

const SET_PREFIX: &str = "search_sync:incremental:updates";

/// Name of the scored set backing `shard`.
pub fn shard_set_name(shard: usize) -> String {
    format!("{}:{}", SET_PREFIX, shard)
}

/// Configuration for the tracking queue consumer.
#[derive(Debug, Clone, Copy)]
pub struct TrackingQueueConfig {
    /// Oldest entries taken from each shard per run.
    pub shard_limit: usize,
    pub bulk: BulkIndexerConfig,
}

impl Default for TrackingQueueConfig {
    fn default() -> Self {
        Self {
            shard_limit: DEFAULT_SHARD_LIMIT,
            bulk: BulkIndexerConfig::default(),
        }
    }
}

/// The slice of one shard taken by a run.
#[derive(Debug)]
struct ShardBatch {
    shard: usize,
    entries: Vec<ScoredMember>,
}

impl ShardBatch {
    fn score_range(&self) -> Option<(i64, i64)> {
        let first = self.entries.first()?.1;
        let last = self.entries.last()?.1;
        Some((first, last))
    }
}

/// Durable staging area between "something changed" and "it is indexed".
pub struct TrackingQueue {
    store: Arc<dyn QueueStore>,
    records: Arc<dyn RecordStore>,
    client: Arc<dyn SearchEngineClient>,
    layout: IndexLayout,
    config: TrackingQueueConfig,
    /// Pause flag; `execute` drains nothing while it is set.
    control_state: Option<Arc<dyn ControlState>>,
}

impl TrackingQueue {
    pub fn new(
        store: Arc<dyn QueueStore>,
        records: Arc<dyn RecordStore>,
        client: Arc<dyn SearchEngineClient>,
        layout: IndexLayout,
    ) -> Self {
        Self::with_config(store, records, client, layout, TrackingQueueConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn QueueStore>,
        records: Arc<dyn RecordStore>,
        client: Arc<dyn SearchEngineClient>,
        layout: IndexLayout,
        config: TrackingQueueConfig,
    ) -> Self {
        Self {
            store,
            records,
            client,
            layout,
            config,
            control_state: None,
        }
    }

    /// Stop draining while indexing is paused.
    ///
    /// Read on every run without caching, so a pause set by a reindexing
    /// task takes effect before the next drain.
    pub fn with_control_state(mut self, control_state: Arc<dyn ControlState>) -> Self {
        self.control_state = Some(control_state);
        self
    }

    /// Queue references for indexing.
    ///
    /// References are grouped by shard and added with one store call per
    /// shard; a reference already queued is moved to the back of its shard.
    pub async fn track(&self, references: &[DocumentReference]) -> Result<(), TrackingQueueError> {
        let mut by_shard: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for reference in references {
            let serialized = reference.serialize();
            by_shard
                .entry(shard_number(&serialized, SHARDS))
                .or_default()
                .push(serialized);
        }

        for (shard, members) in by_shard {
            debug!(shard, count = members.len(), "Tracking references");
            self.store.upsert(&shard_set_name(shard), &members).await?;
        }

        Ok(())
    }

    /// Total number of queued references across all shards.
    pub async fn queue_size(&self) -> Result<u64, TrackingQueueError> {
        let sizes = try_join_all((0..SHARDS).map(|shard| {
            let set = shard_set_name(shard);
            async move { self.store.len(&set).await }
        }))
        .await?;

        Ok(sizes.into_iter().sum())
    }

    /// The entries the next run would take, per non-empty shard.
    pub async fn queued_items(&self) -> Result<BTreeMap<usize, Vec<ScoredMember>>, TrackingQueueError> {
        Ok(self
            .read_batches()
            .await?
            .into_iter()
            .map(|batch| (batch.shard, batch.entries))
            .collect())
    }

    /// Drop every queued reference.
    pub async fn clear_tracking(&self) -> Result<(), TrackingQueueError> {
        for shard in 0..SHARDS {
            self.store.clear(&shard_set_name(shard)).await?;
        }
        warn!("Tracking queue cleared");
        Ok(())
    }

    /// Drain one bounded slice of every shard into the search engine.
    ///
    /// Entries stay in the store until the bulk requests have been answered.
    /// If a request fails as a whole nothing is removed and the error is
    /// returned, so the whole slice is retried by the next run. Otherwise the
    /// slice is removed by score range, which keeps entries re-tracked in the
    /// meantime. Rejected references are tracked again before the removal;
    /// their new score is past the slice, so they survive it.
    ///
    /// While indexing is paused nothing is read and `Ok(0)` is returned.
    ///
    /// # Returns
    ///
    /// The number of references written to the index.
    #[instrument(skip(self))]
    pub async fn execute(&self) -> Result<usize, TrackingQueueError> {
        if let Some(state) = &self.control_state {
            if state.pause_indexing().await? {
                info!("Indexing is paused, leaving the tracking queue untouched");
                return Ok(0);
            }
        }

        let started = Instant::now();
        let batches = self.read_batches().await?;
        if batches.is_empty() {
            debug!("Tracking queue is empty");
            return Ok(0);
        }

        let mut references = Vec::new();
        let mut malformed = 0usize;
        for batch in &batches {
            debug!(shard = batch.shard, count = batch.entries.len(), "Read shard");
            for (member, _) in &batch.entries {
                match DocumentReference::deserialize(member) {
                    Ok(reference) => references.push(reference),
                    Err(e) => {
                        warn!(shard = batch.shard, error = %e, "Dropping malformed queue entry");
                        malformed += 1;
                    }
                }
            }
        }

        let total = references.len();
        let resolved = ReferenceCollection::new(references)
            .resolve(self.records.as_ref())
            .await?;

        let mut indexer = BulkIndexer::with_config(
            Arc::clone(&self.client),
            self.layout.clone(),
            self.config.bulk,
        );
        for item in resolved {
            indexer.process(item).await;
        }

        if let Err(e) = indexer.flush().await {
            error!(
                error = %e,
                count = total,
                "Bulk request failed, leaving entries queued"
            );
            return Err(TrackingQueueError::FlushError(e));
        }

        let failures = indexer.take_failures();
        if !failures.is_empty() {
            self.track(&failures).await?;
        }

        for batch in &batches {
            if let Some((first, last)) = batch.score_range() {
                self.store
                    .remove_range_by_score(&shard_set_name(batch.shard), first, last)
                    .await?;
            }
        }

        let processed = total.saturating_sub(failures.len());
        info!(
            shards = batches.len(),
            processed,
            malformed,
            failures = failures.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Tracking queue run finished"
        );

        Ok(processed)
    }

    async fn read_batches(&self) -> Result<Vec<ShardBatch>, TrackingQueueError> {
        let limit = self.config.shard_limit;
        let batches = try_join_all((0..SHARDS).map(|shard| {
            let set = shard_set_name(shard);
            async move {
                let entries = self.store.range(&set, limit).await?;
                Ok::<_, TrackingQueueError>(ShardBatch { shard, entries })
            }
        }))
        .await?;

        Ok(batches
            .into_iter()
            .filter(|batch| !batch.entries.is_empty())
            .collect())
    }
}
