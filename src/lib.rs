//! Update synchronization of two-party off-chain state channels.
//!
//! Both participants of a channel hold a copy of its state. Every change is a
//! [ChannelUpdate][channel::ChannelUpdate] identified by a nonce, proposed and
//! signed by one participant and countersigned by the other. The
//! [SyncClient] drives the exchange, detects diverging copies by their nonces,
//! resyncs a copy that missed a single update and rejects updates that are
//! badly signed or do not apply.

pub mod sig;
pub mod types;

pub mod channel;
mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod messages;
mod protocol;
pub mod store;
pub mod wire;

pub use client::SyncClient;
pub use config::SyncConfig;
pub use error::{ChannelUpdateError, UpdateErrorReason, UpdateFailure};
pub use types::{Address, Hash, Signature, U256};
