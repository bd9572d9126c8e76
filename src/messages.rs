mod error;
mod state;
mod update;

use crate::{
    channel::ChannelUpdate, error::ChannelUpdateError, types::Address, wire::proto,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("participant count mismatch")]
    ParticipantSizeMismatch,
    #[error("byte length mismatch")]
    ByteLengthMismatch,
    #[error("expected a value for field `{0}`")]
    ExpectedSome(&'static str),
    #[error("unknown error reason {0}")]
    UnknownErrorReason(i32),
}

/// Messages exchanged between the two participants of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorMessage {
    /// A proposed or countersigned update. `latest_update` is the sender's
    /// latest update, used by the receiver to resync.
    Channel {
        from: Address,
        update: ChannelUpdate,
        latest_update: Option<ChannelUpdate>,
    },
    /// The receiver of a [VectorMessage::Channel] rejected the update.
    Error {
        from: Address,
        error: ChannelUpdateError,
    },
}

impl VectorMessage {
    pub fn sender(&self) -> Address {
        match self {
            VectorMessage::Channel { from, .. } | VectorMessage::Error { from, .. } => *from,
        }
    }
}

impl From<&VectorMessage> for proto::Envelope {
    fn from(value: &VectorMessage) -> Self {
        let msg = match value {
            VectorMessage::Channel {
                update,
                latest_update,
                ..
            } => proto::envelope::Msg::ChannelMsg(proto::ChannelMsg {
                update: Some(update.into()),
                latest_update: latest_update.as_ref().map(Into::into),
            }),
            VectorMessage::Error { error, .. } => proto::envelope::Msg::ErrorMsg(error.into()),
        };
        proto::Envelope {
            sender: value.sender().0.to_vec(),
            msg: Some(msg),
        }
    }
}

impl TryFrom<proto::Envelope> for VectorMessage {
    type Error = ConversionError;

    fn try_from(value: proto::Envelope) -> Result<Self, ConversionError> {
        let from = address(&value.sender)?;
        match value.msg.ok_or(ConversionError::ExpectedSome("msg"))? {
            proto::envelope::Msg::ChannelMsg(msg) => Ok(VectorMessage::Channel {
                from,
                update: msg
                    .update
                    .ok_or(ConversionError::ExpectedSome("update"))?
                    .try_into()?,
                latest_update: msg.latest_update.map(TryInto::try_into).transpose()?,
            }),
            proto::envelope::Msg::ErrorMsg(msg) => Ok(VectorMessage::Error {
                from,
                error: msg.try_into()?,
            }),
        }
    }
}

fn address(bytes: &[u8]) -> Result<Address, ConversionError> {
    Address::from_slice(bytes).ok_or(ConversionError::ByteLengthMismatch)
}

fn addresses<const N: usize>(values: &[Vec<u8>]) -> Result<[Address; N], ConversionError> {
    if values.len() != N {
        return Err(ConversionError::ParticipantSizeMismatch);
    }
    let mut out = [Address::default(); N];
    for (a, b) in out.iter_mut().zip(values) {
        *a = address(b)?;
    }
    Ok(out)
}
