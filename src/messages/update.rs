use super::{address, ConversionError};
use crate::{
    channel::{ChannelUpdate, MultisigCommitment, UpdateDetails, PARTICIPANTS},
    types::{Signature, U256},
    wire::proto::{self, update_details::Details},
};

pub(super) fn u256(bytes: &[u8]) -> Result<U256, ConversionError> {
    U256::from_be_slice(bytes).ok_or(ConversionError::ByteLengthMismatch)
}

pub(super) fn balances(values: &[Vec<u8>]) -> Result<[U256; PARTICIPANTS], ConversionError> {
    if values.len() != PARTICIPANTS {
        return Err(ConversionError::ParticipantSizeMismatch);
    }
    let mut out = [U256::zero(); PARTICIPANTS];
    for (a, b) in out.iter_mut().zip(values) {
        *a = u256(b)?;
    }
    Ok(out)
}

impl From<&UpdateDetails> for proto::UpdateDetails {
    fn from(value: &UpdateDetails) -> Self {
        let details = match value {
            UpdateDetails::Setup { timeout, balances } => Details::Setup(proto::SetupDetails {
                timeout: *timeout,
                balances: balances.iter().map(|b| b.to_be_bytes().to_vec()).collect(),
            }),
            UpdateDetails::Transfer { amount } => Details::Transfer(proto::TransferDetails {
                amount: amount.to_be_bytes().to_vec(),
            }),
            UpdateDetails::Close => Details::Close(proto::CloseDetails {}),
        };
        proto::UpdateDetails {
            details: Some(details),
        }
    }
}

impl TryFrom<proto::UpdateDetails> for UpdateDetails {
    type Error = ConversionError;

    fn try_from(value: proto::UpdateDetails) -> Result<Self, Self::Error> {
        match value.details.ok_or(ConversionError::ExpectedSome("details"))? {
            Details::Setup(setup) => Ok(UpdateDetails::Setup {
                timeout: setup.timeout,
                balances: balances(&setup.balances)?,
            }),
            Details::Transfer(transfer) => Ok(UpdateDetails::Transfer {
                amount: u256(&transfer.amount)?,
            }),
            Details::Close(_) => Ok(UpdateDetails::Close),
        }
    }
}

impl From<&ChannelUpdate> for proto::ChannelUpdate {
    fn from(value: &ChannelUpdate) -> Self {
        Self {
            channel_address: value.channel_address.0.to_vec(),
            nonce: value.nonce,
            from_identifier: value.from_identifier.0.to_vec(),
            to_identifier: value.to_identifier.0.to_vec(),
            details: Some((&value.details).into()),
            signatures: value
                .commitment
                .signatures()
                .iter()
                .map(|s| s.map(|s| s.0.to_vec()).unwrap_or_default())
                .collect(),
        }
    }
}

impl TryFrom<proto::ChannelUpdate> for ChannelUpdate {
    type Error = ConversionError;

    fn try_from(value: proto::ChannelUpdate) -> Result<Self, Self::Error> {
        if value.signatures.len() != PARTICIPANTS {
            return Err(ConversionError::ParticipantSizeMismatch);
        }
        let mut signatures = [None; PARTICIPANTS];
        for (slot, bytes) in signatures.iter_mut().zip(&value.signatures) {
            if !bytes.is_empty() {
                *slot = Some(
                    Signature::from_slice(bytes).ok_or(ConversionError::ByteLengthMismatch)?,
                );
            }
        }

        Ok(Self {
            channel_address: address(&value.channel_address)?,
            nonce: value.nonce,
            from_identifier: address(&value.from_identifier)?,
            to_identifier: address(&value.to_identifier)?,
            details: value
                .details
                .ok_or(ConversionError::ExpectedSome("details"))?
                .try_into()?,
            commitment: MultisigCommitment::from_signatures(signatures),
        })
    }
}
