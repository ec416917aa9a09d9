//! PostgreSQL implementation of the indexing switches.

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::interfaces::ControlState;

/// Reads and writes the single row of `search_sync_settings`.
pub struct PostgresControlState {
    pool: sqlx::PgPool,
}

impl PostgresControlState {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ControlState for PostgresControlState {
    async fn pause_indexing(&self) -> Result<bool, StoreError> {
        let paused: Option<bool> =
            sqlx::query_scalar("SELECT pause_indexing FROM search_sync_settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(paused.unwrap_or(false))
    }

    async fn set_pause_indexing(&self, paused: bool) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO search_sync_settings (id, pause_indexing) VALUES (1, $1) \
             ON CONFLICT (id) DO UPDATE SET pause_indexing = $1",
        )
        .bind(paused)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
