//! Access to the primary datastore.

use async_trait::async_trait;
use search_sync_shared::{SourceRecord, SourceType};

use crate::errors::StoreError;

/// Bulk lookup of live records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the records of one type with the given ids.
    ///
    /// Ids without a live record are simply absent from the result.
    async fn find_by_ids(
        &self,
        source_type: SourceType,
        ids: &[i64],
    ) -> Result<Vec<SourceRecord>, StoreError>;
}
