//! Configuration for the search sync service.
//!
//! Everything is read from environment variables (a `.env` file is loaded by
//! the binary first). Unset or unparsable values fall back to the defaults
//! below.

mod dependencies;

pub use dependencies::{ConnectionMode, Dependencies};

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::bulk_indexer::DEFAULT_MAX_BULK_SIZE_MB;
use crate::indexing_control::DEFAULT_PAUSE_CACHE_TTL;
use crate::reindexing::{DEFAULT_DELETE_ORIGINAL_INDEX_AFTER_DAYS, DEFAULT_MAX_RETRY_ATTEMPTS};
use crate::scheduler::DEFAULT_TICK_INTERVAL;
use crate::tracking_queue::DEFAULT_SHARD_LIMIT;
use crate::SyncError;
use search_sync_repository::opensearch::DEFAULT_MAIN_ALIAS;
use search_sync_repository::IndexLayout;
use search_sync_shared::SourceType;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default standalone indices, as `document_type=alias` pairs.
const DEFAULT_STANDALONE_ALIASES: &str = "issue=search-sync-issues,note=search-sync-notes";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Settings of the search sync service.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub opensearch_url: String,
    /// Durable stores live in PostgreSQL when set, in memory otherwise.
    pub database_url: Option<String>,
    pub layout: IndexLayout,
    pub max_bulk_size_mb: u64,
    pub shard_limit: usize,
    pub pause_cache_ttl: Duration,
    pub tick_interval: Duration,
    pub reindex_max_retries: i32,
    pub delete_original_index_after_days: i64,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
}

impl SyncConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `DATABASE_URL`: PostgreSQL URL for the durable stores (default: in-memory stores)
    /// - `SEARCH_SYNC_MAIN_ALIAS`: alias of the main index (default: search-sync)
    /// - `SEARCH_SYNC_STANDALONE_ALIASES`: `document_type=alias` pairs, comma separated
    /// - `SEARCH_SYNC_MAX_BULK_SIZE_MB`: bulk request ceiling (default: 10)
    /// - `SEARCH_SYNC_SHARD_LIMIT`: entries drained per queue shard and run (default: 1000)
    /// - `SEARCH_SYNC_PAUSE_CACHE_TTL_SECS`: pause flag cache lifetime (default: 10)
    /// - `SEARCH_SYNC_TICK_INTERVAL_SECS`: time between scheduler ticks (default: 60)
    /// - `SEARCH_SYNC_REINDEX_MAX_RETRIES`: redispatches per slice (default: 20)
    /// - `SEARCH_SYNC_DELETE_ORIGINAL_INDEX_AFTER_DAYS`: grace period for old indices (default: 14)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: retry interval in seconds (default: 15)
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let main_alias =
            lookup("SEARCH_SYNC_MAIN_ALIAS").unwrap_or_else(|| DEFAULT_MAIN_ALIAS.to_string());
        let standalone = lookup("SEARCH_SYNC_STANDALONE_ALIASES")
            .unwrap_or_else(|| DEFAULT_STANDALONE_ALIASES.to_string());
        let mut layout = IndexLayout::new(main_alias);
        for (source_type, alias) in parse_standalone_aliases(&standalone)? {
            layout = layout.with_standalone(source_type, alias);
        }

        Ok(Self {
            opensearch_url: lookup("OPENSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            layout,
            max_bulk_size_mb: parse_or(
                &lookup,
                "SEARCH_SYNC_MAX_BULK_SIZE_MB",
                DEFAULT_MAX_BULK_SIZE_MB,
            ),
            shard_limit: parse_or(&lookup, "SEARCH_SYNC_SHARD_LIMIT", DEFAULT_SHARD_LIMIT),
            pause_cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "SEARCH_SYNC_PAUSE_CACHE_TTL_SECS",
                DEFAULT_PAUSE_CACHE_TTL.as_secs(),
            )),
            tick_interval: Duration::from_secs(parse_or(
                &lookup,
                "SEARCH_SYNC_TICK_INTERVAL_SECS",
                DEFAULT_TICK_INTERVAL.as_secs(),
            )),
            reindex_max_retries: parse_or(
                &lookup,
                "SEARCH_SYNC_REINDEX_MAX_RETRIES",
                DEFAULT_MAX_RETRY_ATTEMPTS,
            ),
            delete_original_index_after_days: parse_or(
                &lookup,
                "SEARCH_SYNC_DELETE_ORIGINAL_INDEX_AFTER_DAYS",
                DEFAULT_DELETE_ORIGINAL_INDEX_AFTER_DAYS,
            ),
            connection_mode: ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE")),
            retry_interval: Duration::from_secs(parse_or(
                &lookup,
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

/// Parse `document_type=alias` pairs such as `issue=search-sync-issues,note=search-sync-notes`.
pub fn parse_standalone_aliases(raw: &str) -> Result<BTreeMap<SourceType, String>, SyncError> {
    let mut aliases = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (document_type, alias) = pair
            .split_once('=')
            .map(|(t, a)| (t.trim(), a.trim()))
            .filter(|(_, a)| !a.is_empty())
            .ok_or_else(|| SyncError::config(format!("Invalid standalone alias '{}'", pair)))?;
        let source_type = SourceType::from_document_type(document_type).ok_or_else(|| {
            SyncError::config(format!("Unknown document type '{}'", document_type))
        })?;
        aliases.insert(source_type, alias.to_string());
    }
    Ok(aliases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.opensearch_url, "http://localhost:9200");
        assert!(config.database_url.is_none());
        assert_eq!(config.layout.main_alias, "search-sync");
        assert_eq!(config.layout.alias_for(SourceType::Issue), "search-sync-issues");
        assert_eq!(config.layout.alias_for(SourceType::Note), "search-sync-notes");
        assert_eq!(config.layout.alias_for(SourceType::Project), "search-sync");
        assert_eq!(config.max_bulk_size_mb, 10);
        assert_eq!(config.shard_limit, 1000);
        assert_eq!(config.pause_cache_ttl, Duration::from_secs(10));
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert_eq!(config.reindex_max_retries, 20);
        assert_eq!(config.delete_original_index_after_days, 14);
        assert_eq!(config.connection_mode, ConnectionMode::Retry);
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("SEARCH_SYNC_MAIN_ALIAS", "gitlab"),
            ("SEARCH_SYNC_STANDALONE_ALIASES", ""),
            ("SEARCH_SYNC_SHARD_LIMIT", "250"),
            ("SEARCH_SYNC_MAX_BULK_SIZE_MB", "lots"),
            ("OPENSEARCH_CONNECTION_MODE", "FAIL-FAST"),
            ("DATABASE_URL", "postgres://localhost/sync"),
        ]))
        .unwrap();

        assert_eq!(config.layout.all_aliases(), vec!["gitlab".to_string()]);
        assert_eq!(config.shard_limit, 250);
        assert_eq!(config.max_bulk_size_mb, 10);
        assert_eq!(config.connection_mode, ConnectionMode::FailFast);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/sync"));
    }

    #[test]
    fn test_standalone_aliases_are_validated() {
        assert!(parse_standalone_aliases("pipeline=x").is_err());
        assert!(parse_standalone_aliases("issue").is_err());
        assert_eq!(
            parse_standalone_aliases(" merge_request = mrs ").unwrap()[&SourceType::MergeRequest],
            "mrs"
        );
    }
}
