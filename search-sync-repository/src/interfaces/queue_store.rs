//! Durable scored-set store.
//!
//! Backs both the tracking queue shards and the indexing control waiting
//! queues. Every named set behaves like a sorted set: members are unique and
//! ordered by a score the store assigns from a per-set counter.

use async_trait::async_trait;

use crate::errors::StoreError;

/// A member of a scored set together with its current score.
pub type ScoredMember = (String, i64);

/// Trait for interacting with the scored-set store.
///
/// All methods must be atomic with respect to concurrent callers: an `upsert`
/// never loses a member and never produces duplicates, and reading then
/// removing a score range never removes a member that was re-scored in between.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add members at the back of `set`.
    ///
    /// Each member receives the next value of the set's counter, in argument
    /// order. A member already present is moved to the back instead of being
    /// duplicated.
    async fn upsert(&self, set: &str, members: &[String]) -> Result<(), StoreError>;

    /// Up to `limit` members with the lowest scores, lowest first.
    async fn range(&self, set: &str, limit: usize) -> Result<Vec<ScoredMember>, StoreError>;

    /// Remove every member whose score is within `[min, max]`.
    ///
    /// # Returns
    ///
    /// The number of members removed.
    async fn remove_range_by_score(&self, set: &str, min: i64, max: i64)
        -> Result<u64, StoreError>;

    /// Number of members in `set`.
    async fn len(&self, set: &str) -> Result<u64, StoreError>;

    /// Drop every member of `set` and reset its counter.
    async fn clear(&self, set: &str) -> Result<(), StoreError>;
}
