use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::Address;

/// One async mutex per channel address.
///
/// Held for the whole read-apply-write of a channel state, so two updates for
/// the same channel never interleave while different channels proceed in
/// parallel.
#[derive(Debug, Default)]
pub(crate) struct ChannelLocks {
    locks: Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
}

impl ChannelLocks {
    pub(crate) async fn lock(&self, channel_address: Address) -> OwnedMutexGuard<()> {
        // The std mutex is only held to look up the entry, never across the
        // await below.
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(channel_address)
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}
