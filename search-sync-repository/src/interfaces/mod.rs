//! Interface definitions for the search sync collaborators.
//!
//! Every external dependency of the sync subsystem is reached through one of
//! these traits so that implementations can be injected and swapped for
//! fakes in tests.

mod control_state;
mod migration_tracker;
mod queue_store;
mod record_store;
mod reindexing_repository;
mod search_engine_client;

pub use control_state::ControlState;
pub use migration_tracker::MigrationTracker;
pub use queue_store::{QueueStore, ScoredMember};
pub use record_store::RecordStore;
pub use reindexing_repository::ReindexingRepository;
pub use search_engine_client::SearchEngineClient;
