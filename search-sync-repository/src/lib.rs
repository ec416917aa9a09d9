//! # Search Sync Repository
//!
//! This crate provides the collaborator traits the search sync subsystem is
//! written against, together with their implementations: OpenSearch for the
//! search engine, PostgreSQL for the durable stores, and in-memory stores for
//! tests and single-process deployments.

pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod postgres;
pub mod types;

pub use errors::{SearchIndexError, StoreError};
pub use interfaces::{
    ControlState, MigrationTracker, QueueStore, RecordStore, ReindexingRepository,
    ScoredMember, SearchEngineClient,
};
pub use memory::{
    InMemoryControlState, InMemoryQueueStore, InMemoryRecordStore, InMemoryReindexingRepository,
    StaticMigrationTracker,
};
pub use opensearch::{IndexLayout, OpenSearchClient};
pub use postgres::{
    run_migrations, PostgresControlState, PostgresMigrationTracker, PostgresQueueStore,
    PostgresRecordStore, PostgresReindexingRepository,
};
pub use types::{
    AliasSwitch, BulkItemResult, BulkOperation, BulkResponse, IndexSettings, ReindexCounts,
    TaskStatus,
};
