use super::{ChannelUpdate, PartIdx, PARTICIPANTS};
use crate::types::{Address, U256};

/// Latest agreed upon state of a channel.
///
/// Owned by the [ChannelStore][crate::store::ChannelStore], the protocol only
/// ever works on snapshots it has read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub channel_address: Address,
    /// Index 0 is the initiator of the channel.
    pub participants: [Address; PARTICIPANTS],
    pub chain_id: u64,
    pub timeout: u64,
    pub balances: [U256; PARTICIPANTS],
    pub is_final: bool,
    /// Nonce of `latest_update`, `0` if the channel was never updated.
    pub latest_nonce: u64,
    pub latest_update: Option<ChannelUpdate>,
}

impl ChannelState {
    /// A channel that exists but has not been set up, yet.
    pub fn new(
        channel_address: Address,
        participants: [Address; PARTICIPANTS],
        chain_id: u64,
    ) -> Self {
        ChannelState {
            channel_address,
            participants,
            chain_id,
            timeout: 0,
            balances: [U256::zero(); PARTICIPANTS],
            is_final: false,
            latest_nonce: 0,
            latest_update: None,
        }
    }

    pub fn part_idx(&self, participant: &Address) -> Option<PartIdx> {
        self.participants.iter().position(|p| p == participant)
    }

    /// The other participant, if `participant` is part of the channel.
    pub fn counterparty(&self, participant: &Address) -> Option<Address> {
        let idx = self.part_idx(participant)?;
        Some(self.participants[1 - idx])
    }

    /// Sum of all balances, `None` on overflow.
    pub fn total_balance(&self) -> Option<U256> {
        self.balances
            .iter()
            .try_fold(U256::zero(), |acc, b| acc.checked_add(*b))
    }

    /// Replaces the latest update, e.g. by its countersigned version.
    pub(crate) fn with_latest_update(mut self, update: ChannelUpdate) -> Self {
        self.latest_nonce = update.nonce;
        self.latest_update = Some(update);
        self
    }
}
