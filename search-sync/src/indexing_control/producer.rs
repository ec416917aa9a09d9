//! Queue-producing calls and the pause-aware decorator around them.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::errors::IndexingControlError;
use crate::indexing_control::IndexingControl;
use crate::tracking_queue::TrackingQueue;
use search_sync_shared::{DocumentReference, Job};

/// Worker type of the tracking queue producer.
pub const TRACKING_WORKER_TYPE: &str = "search_sync_tracking";

/// A call that feeds work into the indexing pipeline.
///
/// Each worker type has its own waiting queue while indexing is paused, so
/// `worker_type` must be unique among the producers of one
/// [`IndexingControl`].
#[async_trait]
pub trait JobProducer: Send + Sync {
    fn worker_type(&self) -> &str;

    async fn perform(&self, job: &Job) -> Result<(), IndexingControlError>;
}

/// Tracks the references carried by a job.
///
/// Job arguments are serialized document references.
pub struct TrackingProducer {
    queue: Arc<TrackingQueue>,
}

impl TrackingProducer {
    pub fn new(queue: Arc<TrackingQueue>) -> Self {
        Self { queue }
    }

    /// Job tracking `references`.
    pub fn job_for(references: &[DocumentReference]) -> Job {
        Job::new(
            references
                .iter()
                .map(|r| Value::String(r.serialize()))
                .collect(),
        )
    }
}

#[async_trait]
impl JobProducer for TrackingProducer {
    fn worker_type(&self) -> &str {
        TRACKING_WORKER_TYPE
    }

    async fn perform(&self, job: &Job) -> Result<(), IndexingControlError> {
        let references = job
            .args
            .iter()
            .map(|arg| {
                let serialized = arg.as_str().ok_or_else(|| {
                    IndexingControlError::invalid_job(format!("expected a string, got {}", arg))
                })?;
                DocumentReference::deserialize(serialized)
                    .map_err(|e| IndexingControlError::invalid_job(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.queue.track(&references).await?;
        Ok(())
    }
}

/// Parks jobs in the waiting queue while indexing is paused.
///
/// Otherwise the job goes straight to the wrapped producer.
pub struct PauseAwareProducer<P> {
    inner: Arc<P>,
    control: Arc<IndexingControl>,
}

impl<P: JobProducer> PauseAwareProducer<P> {
    pub fn new(inner: Arc<P>, control: Arc<IndexingControl>) -> Self {
        Self { inner, control }
    }
}

#[async_trait]
impl<P: JobProducer> JobProducer for PauseAwareProducer<P> {
    fn worker_type(&self) -> &str {
        self.inner.worker_type()
    }

    async fn perform(&self, job: &Job) -> Result<(), IndexingControlError> {
        if self.control.is_paused().await? {
            debug!(worker_type = self.worker_type(), "Indexing paused, parking job");
            return self
                .control
                .add_to_waiting_queue(self.inner.worker_type(), job)
                .await;
        }

        self.inner.perform(job).await
    }
}
