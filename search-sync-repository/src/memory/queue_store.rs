//! In-memory scored-set store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::interfaces::{QueueStore, ScoredMember};

#[derive(Debug, Default)]
struct ScoredSet {
    counter: i64,
    scores: HashMap<String, i64>,
    by_score: BTreeMap<i64, String>,
}

impl ScoredSet {
    fn upsert(&mut self, member: &str) {
        self.counter += 1;
        if let Some(previous) = self.scores.insert(member.to_string(), self.counter) {
            self.by_score.remove(&previous);
        }
        self.by_score.insert(self.counter, member.to_string());
    }
}

/// Scored-set store held in process memory.
///
/// One mutex guards every set, which makes each call atomic. Nothing
/// survives a restart, so this is meant for tests and single-process setups.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    sets: Mutex<HashMap<String, ScoredSet>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn upsert(&self, set: &str, members: &[String]) -> Result<(), StoreError> {
        let mut sets = self.sets.lock().await;
        let scored = sets.entry(set.to_string()).or_default();
        for member in members {
            scored.upsert(member);
        }
        Ok(())
    }

    async fn range(&self, set: &str, limit: usize) -> Result<Vec<ScoredMember>, StoreError> {
        let sets = self.sets.lock().await;
        Ok(sets
            .get(set)
            .map(|scored| {
                scored
                    .by_score
                    .iter()
                    .take(limit)
                    .map(|(score, member)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove_range_by_score(
        &self,
        set: &str,
        min: i64,
        max: i64,
    ) -> Result<u64, StoreError> {
        if min > max {
            return Ok(0);
        }
        let mut sets = self.sets.lock().await;
        let Some(scored) = sets.get_mut(set) else {
            return Ok(0);
        };

        let doomed: Vec<i64> = scored.by_score.range(min..=max).map(|(s, _)| *s).collect();
        for score in &doomed {
            if let Some(member) = scored.by_score.remove(score) {
                scored.scores.remove(&member);
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn len(&self, set: &str) -> Result<u64, StoreError> {
        let sets = self.sets.lock().await;
        Ok(sets.get(set).map(|s| s.scores.len() as u64).unwrap_or(0))
    }

    async fn clear(&self, set: &str) -> Result<(), StoreError> {
        self.sets.lock().await.remove(set);
        Ok(())
    }
}
