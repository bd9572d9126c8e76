mod encoding;
mod memory;
pub mod proto;

use core::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

pub use encoding::{decode_frame, encode_frame, DecodeError, ProtoBufEncodingLayer, MAX_FRAME_LEN};
pub use memory::{Inbox, LocalNetwork, MemoryBus};

use crate::{messages::VectorMessage, types::Address};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    #[error("peer {0} is unreachable")]
    Unreachable(Address),
    #[error("sending to {0} timed out")]
    Timeout(Address),
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Per-call transport knobs. The protocol's own retry loop lives in the
/// outbound driver, it usually passes `num_retries: 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub timeout: Duration,
    pub num_retries: u32,
}

/// Raw byte transport between identified peers.
///
/// Delivery on the remote side ends up in the receive loop of the peer's
/// [SyncClient][crate::SyncClient].
#[async_trait]
pub trait BytesBus: Debug + Send + Sync {
    async fn send_bytes(&self, to: &Address, msg: &[u8]) -> Result<(), MessagingError>;
}

/// Transport of typed protocol messages.
#[async_trait]
pub trait MessageBus: Debug + Send + Sync {
    async fn send(
        &self,
        to: &Address,
        msg: &VectorMessage,
        options: SendOptions,
    ) -> Result<(), MessagingError>;
}
