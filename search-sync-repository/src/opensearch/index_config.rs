//! Index naming and settings for index generations.
//!
//! Every alias points at one concrete index (a "generation"). Reindexing
//! creates the next generation with settings tuned for bulk loading and
//! restores steady-state settings once the copy has been verified.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use search_sync_shared::SourceType;

use crate::types::IndexSettings;

/// Default alias of the main index.
pub const DEFAULT_MAIN_ALIAS: &str = "search-sync";

/// Which alias each entity type is written to.
///
/// Most types live in the main index; "standalone" types get an index of
/// their own so they can be tuned and migrated separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    /// Alias of the main index.
    pub main_alias: String,
    /// Aliases of standalone indices, by entity type.
    pub standalone: BTreeMap<SourceType, String>,
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self::new(DEFAULT_MAIN_ALIAS)
    }
}

impl IndexLayout {
    /// Create a layout where every type lives in the main index.
    pub fn new(main_alias: impl Into<String>) -> Self {
        Self {
            main_alias: main_alias.into(),
            standalone: BTreeMap::new(),
        }
    }

    /// Give `source_type` its own index behind `alias`.
    pub fn with_standalone(mut self, source_type: SourceType, alias: impl Into<String>) -> Self {
        self.standalone.insert(source_type, alias.into());
        self
    }

    /// Alias that documents of `source_type` are written to.
    pub fn alias_for(&self, source_type: SourceType) -> &str {
        self.standalone
            .get(&source_type)
            .map(String::as_str)
            .unwrap_or(&self.main_alias)
    }

    /// The main alias followed by every standalone alias, without duplicates.
    pub fn all_aliases(&self) -> Vec<String> {
        let mut aliases = vec![self.main_alias.clone()];
        for alias in self.standalone.values() {
            if !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }
        aliases
    }
}

/// Name of the index generation created by a reindexing task.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use search_sync_repository::opensearch::target_index_name;
///
/// let at = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 0).unwrap();
/// assert_eq!(target_index_name("search-sync", 12, at), "search-sync-reindex-12-20260309-1405");
/// ```
pub fn target_index_name(alias: &str, task_id: i64, at: DateTime<Utc>) -> String {
    format!("{}-reindex-{}-{}", alias, task_id, at.format("%Y%m%d-%H%M"))
}

/// Creation body for a new generation: source mappings, source shard count,
/// and settings that favor bulk loading.
pub fn bulk_load_index_body(source: &IndexSettings, mappings: &Value) -> Value {
    json!({
        "settings": {
            "index": {
                "number_of_shards": source.number_of_shards,
                "number_of_replicas": 0,
                "refresh_interval": "-1",
                "translog": { "durability": "async" }
            }
        },
        "mappings": mappings
    })
}

/// Settings to apply to a verified generation before it goes live.
///
/// Replicas and a custom refresh interval are carried over from the source
/// index; without a custom interval the engine default is restored.
pub fn steady_state_settings(source: &IndexSettings) -> Value {
    json!({
        "number_of_replicas": source.number_of_replicas,
        "refresh_interval": source.refresh_interval,
        "translog": { "durability": "request" }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source_settings(refresh_interval: Option<&str>) -> IndexSettings {
        IndexSettings {
            number_of_shards: 5,
            number_of_replicas: 2,
            refresh_interval: refresh_interval.map(str::to_string),
        }
    }

    #[test]
    fn test_alias_for() {
        let layout = IndexLayout::new("main").with_standalone(SourceType::Issue, "main-issues");

        assert_eq!(layout.alias_for(SourceType::Issue), "main-issues");
        assert_eq!(layout.alias_for(SourceType::Project), "main");
        assert_eq!(layout.all_aliases(), vec!["main", "main-issues"]);
    }

    #[test]
    fn test_all_aliases_deduplicates() {
        let layout = IndexLayout::new("main")
            .with_standalone(SourceType::Issue, "shared")
            .with_standalone(SourceType::Note, "shared");
        assert_eq!(layout.all_aliases(), vec!["main", "shared"]);
    }

    #[test]
    fn test_target_index_name() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(
            target_index_name("main-issues", 3, at),
            "main-issues-reindex-3-20261018-0930"
        );
    }

    #[test]
    fn test_bulk_load_body() {
        let body = bulk_load_index_body(&source_settings(None), &json!({"properties": {}}));

        assert_eq!(body["settings"]["index"]["number_of_shards"], 5);
        assert_eq!(body["settings"]["index"]["number_of_replicas"], 0);
        assert_eq!(body["settings"]["index"]["refresh_interval"], "-1");
        assert_eq!(body["settings"]["index"]["translog"]["durability"], "async");
        assert!(body["mappings"]["properties"].is_object());
    }

    #[test]
    fn test_steady_state_settings() {
        let custom = steady_state_settings(&source_settings(Some("30s")));
        assert_eq!(custom["number_of_replicas"], 2);
        assert_eq!(custom["refresh_interval"], "30s");
        assert_eq!(custom["translog"]["durability"], "request");

        let default = steady_state_settings(&source_settings(None));
        assert!(default["refresh_interval"].is_null());
    }
}
