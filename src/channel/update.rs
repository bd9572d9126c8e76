use super::{MultisigCommitment, PartIdx, SignError, PARTICIPANTS};
use crate::{
    sig::Signer,
    types::{Address, Hash, U256},
    wire::proto,
};
use prost::Message;

/// Tag of an update. Only [UpdateType::Setup] has a meaning to the
/// synchronization protocol, the others are interpreted by the
/// [UpdateApplier][super::UpdateApplier] alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    Setup,
    Transfer,
    Close,
}

/// Type specific payload of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDetails {
    /// Opens the channel with the given dispute timeout and initial balances
    /// (indexed like the participants).
    Setup {
        timeout: u64,
        balances: [U256; PARTICIPANTS],
    },
    /// Moves `amount` from the proposer of the update to the other
    /// participant.
    Transfer { amount: U256 },
    /// Marks the state as final, no further updates are accepted.
    Close,
}

impl UpdateDetails {
    pub fn update_type(&self) -> UpdateType {
        match self {
            UpdateDetails::Setup { .. } => UpdateType::Setup,
            UpdateDetails::Transfer { .. } => UpdateType::Transfer,
            UpdateDetails::Close => UpdateType::Close,
        }
    }
}

/// A proposed mutation of a channel, identified by its `nonce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUpdate {
    pub channel_address: Address,
    pub nonce: u64,
    /// Proposer of the update.
    pub from_identifier: Address,
    /// Counterparty expected to countersign.
    pub to_identifier: Address,
    pub details: UpdateDetails,
    pub commitment: MultisigCommitment,
}

impl ChannelUpdate {
    /// Creates an update without any signatures.
    pub fn new(
        channel_address: Address,
        nonce: u64,
        from_identifier: Address,
        to_identifier: Address,
        details: UpdateDetails,
    ) -> Self {
        ChannelUpdate {
            channel_address,
            nonce,
            from_identifier,
            to_identifier,
            details,
            commitment: MultisigCommitment::default(),
        }
    }

    pub fn update_type(&self) -> UpdateType {
        self.details.update_type()
    }

    /// Hash signed by the participants. Covers every field except the
    /// signatures themselves.
    pub fn commitment_hash(&self) -> Hash {
        let core = proto::UpdateCommitment {
            channel_address: self.channel_address.0.to_vec(),
            nonce: self.nonce,
            from_identifier: self.from_identifier.0.to_vec(),
            to_identifier: self.to_identifier.0.to_vec(),
            details: Some((&self.details).into()),
        };
        Hash::keccak256(&core.encode_to_vec())
    }

    /// Adds the signature of `signer` in the slot of participant `part_idx`.
    pub fn sign(&mut self, part_idx: PartIdx, signer: &Signer) -> Result<(), SignError> {
        if self.commitment.signature(part_idx).is_some() {
            return Err(SignError::AlreadySigned(part_idx));
        }
        let sig = signer.sign_eth(self.commitment_hash())?;
        self.commitment.add_signature(part_idx, sig)?;
        Ok(())
    }

    /// Same payload at another position in the channel's history. All
    /// signatures are dropped since they no longer cover the update.
    pub fn rebased(&self, nonce: u64) -> Self {
        ChannelUpdate::new(
            self.channel_address,
            nonce,
            self.from_identifier,
            self.to_identifier,
            self.details.clone(),
        )
    }
}
