//! Error types for the search sync repository.
//!
//! `SearchIndexError` covers the search engine, `StoreError` the durable
//! stores backing queues and reindexing state.

mod search_index_error;
mod store_error;

pub use search_index_error::SearchIndexError;
pub use store_error::StoreError;
