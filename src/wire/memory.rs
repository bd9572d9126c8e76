//! In-process transport, mostly for tests and demos.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BytesBus, MessagingError};
use crate::types::Address;

/// Frames received by one peer.
pub type Inbox = mpsc::UnboundedReceiver<Vec<u8>>;

/// Routes frames between the peers registered on it.
#[derive(Debug, Clone, Default)]
pub struct LocalNetwork {
    peers: Arc<Mutex<HashMap<Address, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `address` and returns its inbox together with the bus it
    /// sends through. Registering again replaces the previous inbox.
    pub fn register(&self, address: Address) -> (MemoryBus, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(address, tx);
        let bus = MemoryBus {
            network: self.clone(),
            local: address,
            dropping: Arc::new(AtomicUsize::new(0)),
        };
        (bus, rx)
    }

    /// Takes `address` offline, sends to it fail from now on.
    pub fn disconnect(&self, address: &Address) {
        self.peers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(address);
    }

    fn route(&self, to: &Address) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.peers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(to)
            .cloned()
    }
}

/// A peer's handle on a [LocalNetwork].
#[derive(Debug, Clone)]
pub struct MemoryBus {
    network: LocalNetwork,
    local: Address,
    dropping: Arc<AtomicUsize>,
}

impl MemoryBus {
    pub fn local_address(&self) -> Address {
        self.local
    }

    /// Makes the next `n` sends fail as if the peer was unreachable.
    pub fn drop_next(&self, n: usize) {
        self.dropping.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl BytesBus for MemoryBus {
    async fn send_bytes(&self, to: &Address, msg: &[u8]) -> Result<(), MessagingError> {
        let dropped = self
            .dropping
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            tracing::debug!(from = %self.local, to = %to, "dropping frame");
            return Err(MessagingError::Unreachable(*to));
        }

        let tx = self
            .network
            .route(to)
            .ok_or(MessagingError::Unreachable(*to))?;
        tx.send(msg.to_vec())
            .map_err(|_| MessagingError::Unreachable(*to))
    }
}
