//! Backpressure valve for the indexing pipeline.
//!
//! While the global pause flag is set, [`PauseAwareProducer`] parks jobs in a
//! per-worker-type waiting queue instead of running them. Once the flag is
//! cleared, [`IndexingControl::resume_processing`] replays the parked jobs in
//! their original order through the direct producers.

mod cached_state;
mod producer;

pub use cached_state::{CachedControlState, DEFAULT_PAUSE_CACHE_TTL};
pub use producer::{JobProducer, PauseAwareProducer, TrackingProducer, TRACKING_WORKER_TYPE};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, instrument, warn, Instrument};

use crate::errors::IndexingControlError;
use search_sync_repository::{ControlState, QueueStore};
use search_sync_shared::Job;

/// Jobs replayed per store round trip while resuming.
pub const RESUME_PAGE_SIZE: usize = 1000;

const WAITING_QUEUE_PREFIX: &str = "search_sync:indexing_control:waiting_queue";

/// Name of the scored set holding the parked jobs of `worker_type`.
pub fn waiting_queue_name(worker_type: &str) -> String {
    format!("{}:{}", WAITING_QUEUE_PREFIX, worker_type)
}

/// Pause flag, waiting queues and the direct producers they are replayed into.
pub struct IndexingControl {
    store: Arc<dyn QueueStore>,
    state: Arc<dyn ControlState>,
    cached_state: CachedControlState,
    producers: BTreeMap<String, Arc<dyn JobProducer>>,
}

impl IndexingControl {
    pub fn new(
        store: Arc<dyn QueueStore>,
        state: Arc<dyn ControlState>,
        pause_cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cached_state: CachedControlState::new(Arc::clone(&state), pause_cache_ttl),
            state,
            producers: BTreeMap::new(),
        }
    }

    /// Register the direct producer parked jobs of its worker type are replayed into.
    pub fn with_producer(mut self, producer: Arc<dyn JobProducer>) -> Self {
        self.producers
            .insert(producer.worker_type().to_string(), producer);
        self
    }

    /// Worker types with a registered producer.
    pub fn worker_types(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }

    /// Cached read of the pause flag, for the producer fast path.
    pub async fn is_paused(&self) -> Result<bool, IndexingControlError> {
        Ok(self.cached_state.pause_indexing().await?)
    }

    #[instrument(skip(self))]
    pub async fn pause(&self) -> Result<(), IndexingControlError> {
        self.cached_state.set_pause_indexing(true).await?;
        info!("Indexing paused");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unpause(&self) -> Result<(), IndexingControlError> {
        self.cached_state.set_pause_indexing(false).await?;
        info!("Indexing unpaused");
        Ok(())
    }

    /// Park `job` at the back of the waiting queue of `worker_type`.
    pub async fn add_to_waiting_queue(
        &self,
        worker_type: &str,
        job: &Job,
    ) -> Result<(), IndexingControlError> {
        let member = serde_json::to_string(job)?;
        self.store
            .upsert(&waiting_queue_name(worker_type), &[member])
            .await?;
        Ok(())
    }

    pub async fn has_jobs_in_waiting_queue(
        &self,
        worker_type: &str,
    ) -> Result<bool, IndexingControlError> {
        Ok(self.store.len(&waiting_queue_name(worker_type)).await? > 0)
    }

    /// Parked jobs across every registered worker type.
    pub async fn queue_size(&self) -> Result<u64, IndexingControlError> {
        let mut total = 0;
        for worker_type in self.producers.keys() {
            total += self.store.len(&waiting_queue_name(worker_type)).await?;
        }
        Ok(total)
    }

    /// Replay the parked jobs of every registered worker type.
    ///
    /// # Returns
    ///
    /// The number of jobs that ran successfully.
    #[instrument(skip(self))]
    pub async fn resume_processing(&self) -> Result<usize, IndexingControlError> {
        let mut resumed = 0;
        for worker_type in self.producers.keys() {
            resumed += self.resume_worker(worker_type).await?;
        }
        Ok(resumed)
    }

    /// Resume when the pause flag is off and jobs are waiting.
    ///
    /// Reads the flag directly so a freshly cleared pause is seen at once.
    pub async fn resume_if_unpaused(&self) -> Result<usize, IndexingControlError> {
        if self.state.pause_indexing().await? {
            return Ok(0);
        }
        if self.queue_size().await? == 0 {
            return Ok(0);
        }
        self.resume_processing().await
    }

    /// Replay the waiting queue of one worker type, oldest job first.
    ///
    /// Jobs are read a page at a time and removed by score range once the
    /// page has run, so jobs parked meanwhile are picked up by a later page.
    /// Jobs that can never succeed are logged and dropped. Any other failure
    /// stops the replay; the jobs from the failing one on stay queued.
    pub async fn resume_worker(&self, worker_type: &str) -> Result<usize, IndexingControlError> {
        let producer = self
            .producers
            .get(worker_type)
            .ok_or_else(|| IndexingControlError::UnknownWorker(worker_type.to_string()))?;
        let set = waiting_queue_name(worker_type);
        let mut resumed = 0;

        loop {
            let page = self.store.range(&set, RESUME_PAGE_SIZE).await?;
            let (first, last) = match (page.first(), page.last()) {
                (Some(first), Some(last)) => (first.1, last.1),
                _ => break,
            };

            let mut done = None;
            for (member, score) in &page {
                let outcome = match serde_json::from_str::<Job>(member) {
                    Ok(job) => {
                        let span = info_span!(
                            "resumed_job",
                            worker_type,
                            context = ?job.context
                        );
                        producer.perform(&job).instrument(span).await
                    }
                    Err(e) => Err(e.into()),
                };

                match outcome {
                    Ok(()) => resumed += 1,
                    Err(e) if e.is_permanent() => {
                        warn!(worker_type, error = %e, "Dropping parked job");
                    }
                    Err(e) => {
                        if let Some(done) = done {
                            self.store.remove_range_by_score(&set, first, done).await?;
                        }
                        return Err(e);
                    }
                }
                done = Some(*score);
            }

            self.store.remove_range_by_score(&set, first, last).await?;
        }

        self.store.clear(&set).await?;
        info!(worker_type, resumed, "Waiting queue replayed");
        Ok(resumed)
    }
}
