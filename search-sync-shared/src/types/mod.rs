//! This module defines the core data structures shared across the search sync crates.

pub mod document_reference;
pub mod job;
pub mod reindexing;
pub mod source_record;

pub use document_reference::{shard_number, DocumentReference, InvalidFormatError};
pub use job::{Job, JobContext, CONTEXT_WHITELIST};
pub use reindexing::{
    NewReindexingSubtask, NewReindexingTask, ReindexingSlice, ReindexingState, ReindexingSubtask,
    ReindexingTask,
};
pub use source_record::{Indexable, SourceRecord, SourceType};
