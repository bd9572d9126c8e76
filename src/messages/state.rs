use super::{address, addresses, update::balances, ConversionError};
use crate::{channel::ChannelState, wire::proto};

impl From<&ChannelState> for proto::ChannelState {
    fn from(value: &ChannelState) -> Self {
        Self {
            channel_address: value.channel_address.0.to_vec(),
            participants: value.participants.iter().map(|p| p.0.to_vec()).collect(),
            chain_id: value.chain_id,
            timeout: value.timeout,
            balances: value
                .balances
                .iter()
                .map(|b| b.to_be_bytes().to_vec())
                .collect(),
            is_final: value.is_final,
            latest_nonce: value.latest_nonce,
            latest_update: value.latest_update.as_ref().map(Into::into),
        }
    }
}

impl TryFrom<proto::ChannelState> for ChannelState {
    type Error = ConversionError;

    fn try_from(value: proto::ChannelState) -> Result<Self, Self::Error> {
        Ok(Self {
            channel_address: address(&value.channel_address)?,
            participants: addresses(&value.participants)?,
            chain_id: value.chain_id,
            timeout: value.timeout,
            balances: balances(&value.balances)?,
            is_final: value.is_final,
            latest_nonce: value.latest_nonce,
            latest_update: value.latest_update.map(TryInto::try_into).transpose()?,
        })
    }
}
