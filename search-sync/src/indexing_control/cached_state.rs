//! Pause flag with a short-lived cache.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use search_sync_repository::{ControlState, StoreError};

/// Default time a cached pause flag is trusted.
pub const DEFAULT_PAUSE_CACHE_TTL: Duration = Duration::from_secs(10);

/// Caches reads of the pause flag for the producer fast path.
///
/// Writes go straight through and refresh the cache. Readers in other
/// processes may see a stale value for up to `ttl`.
pub struct CachedControlState {
    inner: Arc<dyn ControlState>,
    ttl: Duration,
    cached: Mutex<Option<(bool, Instant)>>,
}

impl CachedControlState {
    pub fn new(inner: Arc<dyn ControlState>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Forget the cached value.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[async_trait]
impl ControlState for CachedControlState {
    async fn pause_indexing(&self) -> Result<bool, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some((paused, read_at)) = *cached {
            if read_at.elapsed() < self.ttl {
                return Ok(paused);
            }
        }

        let paused = self.inner.pause_indexing().await?;
        *cached = Some((paused, Instant::now()));
        Ok(paused)
    }

    async fn set_pause_indexing(&self, paused: bool) -> Result<(), StoreError> {
        self.inner.set_pause_indexing(paused).await?;
        *self.cached.lock().await = Some((paused, Instant::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_repository::InMemoryControlState;

    #[tokio::test]
    async fn test_reads_are_cached_until_ttl() {
        let inner = Arc::new(InMemoryControlState::new(false));
        let cached = CachedControlState::new(inner.clone(), Duration::from_secs(60));

        assert!(!cached.pause_indexing().await.unwrap());
        inner.set_pause_indexing(true).await.unwrap();
        assert!(!cached.pause_indexing().await.unwrap());

        cached.invalidate().await;
        assert!(cached.pause_indexing().await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_always_reads_through() {
        let inner = Arc::new(InMemoryControlState::new(false));
        let cached = CachedControlState::new(inner.clone(), Duration::ZERO);

        assert!(!cached.pause_indexing().await.unwrap());
        inner.set_pause_indexing(true).await.unwrap();
        assert!(cached.pause_indexing().await.unwrap());
    }

    #[tokio::test]
    async fn test_writes_refresh_the_cache() {
        let inner = Arc::new(InMemoryControlState::new(false));
        let cached = CachedControlState::new(inner.clone(), Duration::from_secs(60));
        assert!(!cached.pause_indexing().await.unwrap());

        cached.set_pause_indexing(true).await.unwrap();

        assert!(cached.pause_indexing().await.unwrap());
        assert!(inner.pause_indexing().await.unwrap());
    }
}
