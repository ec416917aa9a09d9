//! In-memory implementations of the store interfaces.
//!
//! Used by the test suites and when no database is configured.

mod control_state;
mod queue_store;
mod record_store;
mod reindexing_repository;

pub use control_state::InMemoryControlState;
pub use queue_store::InMemoryQueueStore;
pub use record_store::{InMemoryRecordStore, StaticMigrationTracker};
pub use reindexing_repository::InMemoryReindexingRepository;
