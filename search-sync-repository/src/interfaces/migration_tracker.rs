//! Index schema migration status.

use async_trait::async_trait;

use crate::errors::StoreError;

/// Reports whether index schema migrations are still outstanding.
#[async_trait]
pub trait MigrationTracker: Send + Sync {
    async fn has_pending_migrations(&self) -> Result<bool, StoreError>;
}
