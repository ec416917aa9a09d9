//! PostgreSQL-backed durable stores.
//!
//! Schema lives in `migrations/` and is applied with [`run_migrations`]
//! before any store is used.

mod control_state;
mod queue_store;
mod record_store;
mod reindexing_repository;

pub use control_state::PostgresControlState;
pub use queue_store::PostgresQueueStore;
pub use record_store::{PostgresMigrationTracker, PostgresRecordStore};
pub use reindexing_repository::PostgresReindexingRepository;

use crate::errors::StoreError;

/// Applies the embedded schema migrations.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("src/postgres/migrations").run(pool).await?;
    Ok(())
}
