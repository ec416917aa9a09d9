//! Periodic driver for the sync subsystem.
//!
//! Every tick runs the pieces that have to be invoked repeatedly, in order:
//! replay parked jobs once indexing is unpaused, drain the tracking queue,
//! advance the current reindexing task and drop expired index generations.
//! A failing step is logged and the next one still runs; everything is safe
//! to re-run on the following tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::indexing_control::IndexingControl;
use crate::reindexing::ClusterReindexingService;
use crate::tracking_queue::TrackingQueue;
use search_sync_shared::ReindexingState;

/// Default time between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// What one tick did. Steps that failed report `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub jobs_resumed: Option<usize>,
    pub documents_indexed: Option<usize>,
    pub reindexing_state: Option<ReindexingState>,
    pub indices_dropped: Option<usize>,
}

/// Runs the sync steps on a fixed interval until shut down.
pub struct Scheduler {
    control: Arc<IndexingControl>,
    queue: Arc<TrackingQueue>,
    reindexing: Arc<ClusterReindexingService>,
    config: SchedulerConfig,
    shutdown_tx: broadcast::Sender<()>,
    /// Ticks run since startup.
    total_ticks: Arc<AtomicU64>,
    /// Documents written to the index since startup.
    total_documents_indexed: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(
        control: Arc<IndexingControl>,
        queue: Arc<TrackingQueue>,
        reindexing: Arc<ClusterReindexingService>,
        config: SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            control,
            queue,
            reindexing,
            config,
            shutdown_tx,
            total_ticks: Arc::new(AtomicU64::new(0)),
            total_documents_indexed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Tick until Ctrl-C or [`shutdown`](Self::shutdown).
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            tick_interval_secs = self.config.tick_interval.as_secs(),
            "Starting search sync scheduler"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        info!(
            total_ticks = self.total_ticks.load(Ordering::Relaxed),
            total_documents_indexed = self.total_documents_indexed.load(Ordering::Relaxed),
            "Scheduler shutdown complete"
        );
    }

    /// Run every step once.
    pub async fn tick(&self) -> TickSummary {
        let tick = self.total_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(tick, "Scheduler tick");
        let mut summary = TickSummary::default();

        match self.control.resume_if_unpaused().await {
            Ok(resumed) => summary.jobs_resumed = Some(resumed),
            Err(e) => error!(error = %e, "Failed to resume parked jobs"),
        }

        match self.queue.execute().await {
            Ok(indexed) => {
                self.total_documents_indexed
                    .fetch_add(indexed as u64, Ordering::Relaxed);
                summary.documents_indexed = Some(indexed);
            }
            Err(e) => error!(error = %e, "Failed to drain the tracking queue"),
        }

        match self.reindexing.execute().await {
            Ok(state) => summary.reindexing_state = state,
            Err(e) => error!(error = %e, "Reindexing step failed"),
        }

        match self.reindexing.drop_old_indices().await {
            Ok(dropped) => summary.indices_dropped = Some(dropped),
            Err(e) => error!(error = %e, "Failed to drop old indices"),
        }

        info!(
            tick,
            jobs_resumed = summary.jobs_resumed,
            documents_indexed = summary.documents_indexed,
            reindexing_state = summary.reindexing_state.map(|s| s.as_str()),
            indices_dropped = summary.indices_dropped,
            "Scheduler tick finished"
        );
        summary
    }

    /// Stop a running [`run`](Self::run) loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
