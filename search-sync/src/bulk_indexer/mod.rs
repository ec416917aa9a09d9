//! Bulk indexer for the search sync subsystem.
//!
//! Turns resolved document references into index/delete operations and ships
//! them to the search engine in batches bounded by a byte ceiling.

use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use crate::references::ResolvedReference;
use search_sync_repository::{
    BulkOperation, IndexLayout, SearchEngineClient, SearchIndexError,
};
use search_sync_shared::{DocumentReference, Indexable};

/// Default bulk request ceiling in megabytes.
pub const DEFAULT_MAX_BULK_SIZE_MB: u64 = 10;

/// Configuration for the bulk indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkIndexerConfig {
    /// Upper bound for the serialized size of one bulk request.
    pub bulk_limit_bytes: usize,
}

impl BulkIndexerConfig {
    pub fn from_megabytes(megabytes: u64) -> Self {
        Self {
            bulk_limit_bytes: (megabytes as usize) * 1024 * 1024,
        }
    }
}

impl Default for BulkIndexerConfig {
    fn default() -> Self {
        Self::from_megabytes(DEFAULT_MAX_BULK_SIZE_MB)
    }
}

/// Accumulates operations and submits them in size-bounded bulk requests.
///
/// One instance serves one consumer run: it is driven through `&mut self`
/// and is not meant to be shared between concurrent callers.
///
/// Every request is fully accounted for. Items the engine rejects end up in
/// [`failures`](Self::failures); when a request fails as a whole every
/// reference of that batch does, and the error is returned by the next
/// [`flush`](Self::flush).
pub struct BulkIndexer {
    client: Arc<dyn SearchEngineClient>,
    layout: IndexLayout,
    config: BulkIndexerConfig,
    operations: Vec<BulkOperation>,
    references: Vec<DocumentReference>,
    buffered_bytes: usize,
    failures: Vec<DocumentReference>,
    request_error: Option<SearchIndexError>,
}

impl BulkIndexer {
    pub fn new(client: Arc<dyn SearchEngineClient>, layout: IndexLayout) -> Self {
        Self::with_config(client, layout, BulkIndexerConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn SearchEngineClient>,
        layout: IndexLayout,
        config: BulkIndexerConfig,
    ) -> Self {
        Self {
            client,
            layout,
            config,
            operations: Vec::new(),
            references: Vec::new(),
            buffered_bytes: 0,
            failures: Vec::new(),
            request_error: None,
        }
    }

    /// Queue the index or delete operation for one reference.
    ///
    /// Sends the buffered batch first when this operation would push it past
    /// the ceiling. An operation larger than the ceiling on its own is sent
    /// alone.
    pub async fn process(&mut self, resolved: ResolvedReference) {
        let operation = self.operation_for(&resolved);
        let size = operation.byte_size();

        if !self.operations.is_empty() && self.buffered_bytes + size > self.config.bulk_limit_bytes
        {
            self.send().await;
        }

        self.operations.push(operation);
        self.references.push(resolved.reference);
        self.buffered_bytes += size;

        if self.buffered_bytes >= self.config.bulk_limit_bytes {
            self.send().await;
        }
    }

    /// Send whatever is buffered.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every request went through; item-level rejections are in `failures`
    /// * `Err(SearchIndexError)` - At least one request failed as a whole
    #[instrument(skip(self), fields(buffered = self.operations.len()))]
    pub async fn flush(&mut self) -> Result<(), SearchIndexError> {
        self.send().await;

        match self.request_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// References that were not written, in submission order.
    pub fn failures(&self) -> &[DocumentReference] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<DocumentReference> {
        std::mem::take(&mut self.failures)
    }

    /// Serialized size of the batch waiting to be sent.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    fn operation_for(&self, resolved: &ResolvedReference) -> BulkOperation {
        let reference = &resolved.reference;
        let index = self.layout.alias_for(reference.source_type).to_string();

        match &resolved.record {
            Some(record) => BulkOperation::Index {
                index,
                id: reference.document_id.clone(),
                routing: reference.routing_key.clone(),
                document: record.as_indexed_json(),
            },
            None => BulkOperation::Delete {
                index,
                id: reference.document_id.clone(),
                routing: reference.routing_key.clone(),
            },
        }
    }

    async fn send(&mut self) {
        if self.operations.is_empty() {
            return;
        }

        let operations = std::mem::take(&mut self.operations);
        let references = std::mem::take(&mut self.references);
        let bytes = std::mem::replace(&mut self.buffered_bytes, 0);

        debug!(count = operations.len(), bytes, "Sending bulk request");

        match self.client.bulk(&operations).await {
            Ok(response) => {
                let mut rejected = 0;
                for (position, reference) in references.into_iter().enumerate() {
                    let failed = response
                        .items
                        .get(position)
                        .map(|item| item.is_error())
                        .unwrap_or(true);
                    if failed {
                        if let Some(item) = response.items.get(position) {
                            warn!(
                                reference = %reference,
                                status = item.status,
                                error = item.error.as_deref().unwrap_or_default(),
                                "Bulk item rejected"
                            );
                        }
                        rejected += 1;
                        self.failures.push(reference);
                    }
                }
                if rejected > 0 {
                    warn!(
                        count = operations.len(),
                        rejected, "Bulk request completed with some failures"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, count = operations.len(), "Bulk request failed");
                self.failures.extend(references);
                if self.request_error.is_none() {
                    self.request_error = Some(e);
                }
            }
        }
    }
}
