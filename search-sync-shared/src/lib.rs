//! # Search Sync Shared
//!
//! This crate defines shared data structures used across the search sync
//! crates: document references and the records they point to, the jobs parked
//! while indexing is paused, and the persisted cluster reindexing task rows.

pub mod types;

pub use types::{
    shard_number, DocumentReference, Indexable, InvalidFormatError, Job, JobContext,
    NewReindexingSubtask, NewReindexingTask, ReindexingSlice, ReindexingState, ReindexingSubtask,
    ReindexingTask, SourceRecord, SourceType,
};
