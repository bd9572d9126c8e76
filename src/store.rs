//! Persistence of channel states.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{channel::ChannelState, types::Address};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Durable mapping from channel address to the latest channel state.
///
/// Last write wins. Callers serialize writes per channel address.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get_channel_state(
        &self,
        channel_address: &Address,
    ) -> Result<Option<ChannelState>, StoreError>;

    async fn save_channel_state(&self, state: &ChannelState) -> Result<(), StoreError>;
}

/// In-memory [ChannelStore].
///
/// Besides being the store of short lived nodes it allows injecting save
/// failures and counts successful writes, which tests use to check that a
/// rejected update left the store untouched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    channels: RwLock<HashMap<Address, ChannelState>>,
    failing_saves: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls to `save_channel_state` fail.
    pub fn fail_next_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Number of successful `save_channel_state` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn get_channel_state(
        &self,
        channel_address: &Address,
    ) -> Result<Option<ChannelState>, StoreError> {
        Ok(self.channels.read().await.get(channel_address).cloned())
    }

    async fn save_channel_state(&self, state: &ChannelState) -> Result<(), StoreError> {
        let injected = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Backend("injected save failure".into()));
        }

        self.channels
            .write()
            .await
            .insert(state.channel_address, state.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
