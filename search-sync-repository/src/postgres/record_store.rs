//! PostgreSQL-backed record lookups and migration status.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::FromRow;

use search_sync_shared::{SourceRecord, SourceType};

use crate::errors::StoreError;
use crate::interfaces::{MigrationTracker, RecordStore};

#[derive(Debug, FromRow)]
struct RecordRow {
    id: i64,
    document_id: String,
    routing_key: Option<String>,
    fields: Value,
}

/// Reads records from the `search_sync_source_records` projection.
pub struct PostgresRecordStore {
    pool: sqlx::PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn find_by_ids(
        &self,
        source_type: SourceType,
        ids: &[i64],
    ) -> Result<Vec<SourceRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT id, document_id, routing_key, fields FROM search_sync_source_records \
             WHERE source_type = $1 AND id = ANY($2)",
        )
        .bind(source_type.as_str())
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SourceRecord {
                source_type,
                id: row.id,
                document_id: row.document_id,
                routing_key: row.routing_key,
                fields: row.fields,
            })
            .collect())
    }
}

/// Reports pending rows of `search_sync_index_migrations`.
pub struct PostgresMigrationTracker {
    pool: sqlx::PgPool,
}

impl PostgresMigrationTracker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationTracker for PostgresMigrationTracker {
    async fn has_pending_migrations(&self) -> Result<bool, StoreError> {
        let pending: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM search_sync_index_migrations WHERE completed_at IS NULL)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "src/postgres/migrations")]
    async fn missing_records_are_absent(pool: sqlx::PgPool) {
        sqlx::query(
            "INSERT INTO search_sync_source_records (source_type, id, document_id, routing_key, fields) \
             VALUES ('Issue', 1, 'issue_1', 'project_7', '{\"title\": \"a\"}')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let store = PostgresRecordStore::new(pool);

        let records = store.find_by_ids(SourceType::Issue, &[1, 2]).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].routing_key.as_deref(), Some("project_7"));
        assert_eq!(records[0].fields["title"], "a");
    }

    #[sqlx::test(migrations = "src/postgres/migrations")]
    async fn unfinished_migration_is_pending(pool: sqlx::PgPool) {
        let tracker = PostgresMigrationTracker::new(pool.clone());
        assert!(!tracker.has_pending_migrations().await.unwrap());

        sqlx::query("INSERT INTO search_sync_index_migrations (version, name) VALUES (1, 'add_field')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(tracker.has_pending_migrations().await.unwrap());
    }
}
