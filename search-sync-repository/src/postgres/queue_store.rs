//! PostgreSQL implementation of the scored-set store.
//!
//! Members live in `search_sync_queue_entries` keyed by `(set_name, member)`,
//! so re-adding a member is an upsert that only moves its score. Scores come
//! from a per-set counter row that is bumped in the same transaction.

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::interfaces::{QueueStore, ScoredMember};

/// PostgreSQL-backed scored-set store.
pub struct PostgresQueueStore {
    /// PostgreSQL connection pool
    pool: sqlx::PgPool,
}

impl PostgresQueueStore {
    /// Creates a new store on a pool whose schema has been migrated.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueStore for PostgresQueueStore {
    async fn upsert(&self, set: &str, members: &[String]) -> Result<(), StoreError> {
        if members.is_empty() {
            return Ok(());
        }
        let count = members.len() as i64;

        let mut tx = self.pool.begin().await?;
        let last_score: i64 = sqlx::query_scalar(
            "INSERT INTO search_sync_queue_counters (set_name, score) VALUES ($1, $2) \
             ON CONFLICT (set_name) DO UPDATE SET score = search_sync_queue_counters.score + EXCLUDED.score \
             RETURNING score",
        )
        .bind(set)
        .bind(count)
        .fetch_one(&mut *tx)
        .await?;

        let first_score = last_score - count + 1;
        for (offset, member) in members.iter().enumerate() {
            sqlx::query(
                "INSERT INTO search_sync_queue_entries (set_name, member, score) VALUES ($1, $2, $3) \
                 ON CONFLICT (set_name, member) DO UPDATE SET score = EXCLUDED.score",
            )
            .bind(set)
            .bind(member)
            .bind(first_score + offset as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn range(&self, set: &str, limit: usize) -> Result<Vec<ScoredMember>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT member, score FROM search_sync_queue_entries \
             WHERE set_name = $1 ORDER BY score ASC LIMIT $2",
        )
        .bind(set)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn remove_range_by_score(
        &self,
        set: &str,
        min: i64,
        max: i64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM search_sync_queue_entries \
             WHERE set_name = $1 AND score >= $2 AND score <= $3",
        )
        .bind(set)
        .bind(min)
        .bind(max)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn len(&self, set: &str) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM search_sync_queue_entries WHERE set_name = $1")
                .bind(set)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }

    async fn clear(&self, set: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM search_sync_queue_entries WHERE set_name = $1")
            .bind(set)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM search_sync_queue_counters WHERE set_name = $1")
            .bind(set)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }
}
