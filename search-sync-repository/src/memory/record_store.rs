//! In-memory primary datastore stand-in.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use search_sync_shared::{SourceRecord, SourceType};

use crate::errors::StoreError;
use crate::interfaces::{MigrationTracker, RecordStore};

/// Records keyed by type and id.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<(SourceType, i64), SourceRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: SourceRecord) {
        self.records
            .write()
            .await
            .insert((record.source_type, record.id), record);
    }

    pub async fn remove(&self, source_type: SourceType, id: i64) {
        self.records.write().await.remove(&(source_type, id));
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_by_ids(
        &self,
        source_type: SourceType,
        ids: &[i64],
    ) -> Result<Vec<SourceRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| records.get(&(source_type, *id)).cloned())
            .collect())
    }
}

/// Migration tracker with a fixed answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticMigrationTracker {
    pub pending: bool,
}

#[async_trait]
impl MigrationTracker for StaticMigrationTracker {
    async fn has_pending_migrations(&self) -> Result<bool, StoreError> {
        Ok(self.pending)
    }
}
