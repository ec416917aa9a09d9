//! Batch resolution of document references.
//!
//! References coming off a queue only carry identities. Before they can be
//! indexed they are resolved against the primary datastore with one bulk
//! lookup per entity type.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use search_sync_repository::{RecordStore, StoreError};
use search_sync_shared::{DocumentReference, SourceRecord, SourceType};

/// A reference together with its live record.
///
/// `record` is `None` when the source record no longer exists, which means
/// the document has to be removed from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReference {
    pub reference: DocumentReference,
    pub record: Option<SourceRecord>,
}

impl ResolvedReference {
    pub fn is_deleted(&self) -> bool {
        self.record.is_none()
    }
}

/// A batch of references resolved together.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCollection {
    references: Vec<DocumentReference>,
}

impl ReferenceCollection {
    pub fn new(references: Vec<DocumentReference>) -> Self {
        Self { references }
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Distinct source ids per entity type.
    pub fn ids_by_type(&self) -> BTreeMap<SourceType, Vec<i64>> {
        let mut grouped: BTreeMap<SourceType, Vec<i64>> = BTreeMap::new();
        for reference in &self.references {
            let ids = grouped.entry(reference.source_type).or_default();
            if !ids.contains(&reference.source_id) {
                ids.push(reference.source_id);
            }
        }
        grouped
    }

    /// Look up every record and pair it with its reference, in input order.
    pub async fn resolve(
        self,
        store: &dyn RecordStore,
    ) -> Result<Vec<ResolvedReference>, StoreError> {
        let mut found: HashMap<(SourceType, i64), SourceRecord> = HashMap::new();
        for (source_type, ids) in self.ids_by_type() {
            let records = store.find_by_ids(source_type, &ids).await?;
            debug!(
                source_type = %source_type,
                requested = ids.len(),
                found = records.len(),
                "Resolved references"
            );
            for record in records {
                found.insert((record.source_type, record.id), record);
            }
        }

        Ok(self
            .references
            .into_iter()
            .map(|reference| {
                let record = found
                    .get(&(reference.source_type, reference.source_id))
                    .cloned();
                ResolvedReference { reference, record }
            })
            .collect())
    }
}

impl FromIterator<DocumentReference> for ReferenceCollection {
    fn from_iter<I: IntoIterator<Item = DocumentReference>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
