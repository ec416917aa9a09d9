//! In-memory indexing switches.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::StoreError;
use crate::interfaces::ControlState;

/// Pause flag held in an atomic.
#[derive(Debug, Default)]
pub struct InMemoryControlState {
    paused: AtomicBool,
}

impl InMemoryControlState {
    pub fn new(paused: bool) -> Self {
        Self {
            paused: AtomicBool::new(paused),
        }
    }
}

#[async_trait]
impl ControlState for InMemoryControlState {
    async fn pause_indexing(&self) -> Result<bool, StoreError> {
        Ok(self.paused.load(Ordering::SeqCst))
    }

    async fn set_pause_indexing(&self, paused: bool) -> Result<(), StoreError> {
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }
}
