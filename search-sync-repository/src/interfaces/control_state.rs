//! Operator-controlled indexing switches.

use async_trait::async_trait;

use crate::errors::StoreError;

/// Read/write access to the global "pause indexing" flag.
#[async_trait]
pub trait ControlState: Send + Sync {
    async fn pause_indexing(&self) -> Result<bool, StoreError>;

    async fn set_pause_indexing(&self, paused: bool) -> Result<(), StoreError>;
}
