mod commitment;
pub mod payment;
mod state;
mod update;

use crate::{types::Address, types::Hash, wire::proto};
use prost::Message;

pub use commitment::*;
pub use payment::{ApplyError, PaymentApplier, UpdateApplier};
pub use state::*;
pub use update::*;

/// ID (Index) of a participant in the channel.
///
/// `0` is the initiator of the channel.
pub type PartIdx = usize;

/// Channels are strictly two-party.
pub const PARTICIPANTS: usize = 2;

/// Deterministic address of the channel between `initiator` and `responder` on
/// `chain_id`.
///
/// Like an Ethereum address it is made of the last 20 bytes of the Keccak256
/// hash, here over the protobuf encoded parameters.
pub fn channel_address(initiator: Address, responder: Address, chain_id: u64) -> Address {
    let params = proto::ChannelParams {
        initiator: initiator.0.to_vec(),
        responder: responder.0.to_vec(),
        chain_id,
    };
    let hash = Hash::keccak256(&params.encode_to_vec());

    let mut addr = Address::default();
    addr.0.copy_from_slice(&hash.0[32 - 20..]);
    addr
}
