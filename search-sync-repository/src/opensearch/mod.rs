//! OpenSearch implementation of the search engine client.
//!
//! This module provides a concrete implementation of `SearchEngineClient`
//! using OpenSearch as the backend, plus the index naming and settings rules
//! shared by every backend.

mod client;
mod index_config;

pub use client::OpenSearchClient;
pub use index_config::{
    bulk_load_index_body, steady_state_settings, target_index_name, IndexLayout,
    DEFAULT_MAIN_ALIAS,
};
