use super::ConversionError;
use crate::{
    error::{ChannelUpdateError, UpdateErrorReason, UpdateFailure},
    wire::proto,
};

impl From<UpdateErrorReason> for proto::ErrorReason {
    fn from(value: UpdateErrorReason) -> Self {
        match value {
            UpdateErrorReason::ChannelNotFound => proto::ErrorReason::ChannelNotFound,
            UpdateErrorReason::BadSignatures => proto::ErrorReason::BadSignatures,
            UpdateErrorReason::StaleUpdateNonce => proto::ErrorReason::StaleUpdateNonce,
            UpdateErrorReason::StaleChannelNonce => proto::ErrorReason::StaleChannelNonce,
            UpdateErrorReason::StaleChannelNonceNoUpdate => {
                proto::ErrorReason::StaleChannelNonceNoUpdate
            }
            UpdateErrorReason::ApplyUpdateFailed => proto::ErrorReason::ApplyUpdateFailed,
            UpdateErrorReason::SaveChannelFailed => proto::ErrorReason::SaveChannelFailed,
            UpdateErrorReason::MessageFailed => proto::ErrorReason::MessageFailed,
        }
    }
}

impl TryFrom<i32> for UpdateErrorReason {
    type Error = ConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let reason = match proto::ErrorReason::from_i32(value) {
            Some(proto::ErrorReason::ChannelNotFound) => UpdateErrorReason::ChannelNotFound,
            Some(proto::ErrorReason::BadSignatures) => UpdateErrorReason::BadSignatures,
            Some(proto::ErrorReason::StaleUpdateNonce) => UpdateErrorReason::StaleUpdateNonce,
            Some(proto::ErrorReason::StaleChannelNonce) => UpdateErrorReason::StaleChannelNonce,
            Some(proto::ErrorReason::StaleChannelNonceNoUpdate) => {
                UpdateErrorReason::StaleChannelNonceNoUpdate
            }
            Some(proto::ErrorReason::ApplyUpdateFailed) => UpdateErrorReason::ApplyUpdateFailed,
            Some(proto::ErrorReason::SaveChannelFailed) => UpdateErrorReason::SaveChannelFailed,
            Some(proto::ErrorReason::MessageFailed) => UpdateErrorReason::MessageFailed,
            Some(proto::ErrorReason::Unspecified) | None => {
                return Err(ConversionError::UnknownErrorReason(value))
            }
        };
        Ok(reason)
    }
}

impl From<&ChannelUpdateError> for proto::ErrorMsg {
    fn from(value: &ChannelUpdateError) -> Self {
        Self {
            reason: proto::ErrorReason::from(value.reason()) as i32,
            update: Some((&value.update).into()),
            state: value.state.as_ref().map(Into::into),
            counterparty_latest_update: value.counterparty_latest_update().map(Into::into),
            message: value.failure.message().to_string(),
        }
    }
}

impl TryFrom<proto::ErrorMsg> for ChannelUpdateError {
    type Error = ConversionError;

    fn try_from(value: proto::ErrorMsg) -> Result<Self, Self::Error> {
        let reason = UpdateErrorReason::try_from(value.reason)?;
        let counterparty_latest_update = value
            .counterparty_latest_update
            .map(TryInto::try_into)
            .transpose()?;

        Ok(Self {
            failure: UpdateFailure::from_parts(reason, value.message, counterparty_latest_update),
            update: value
                .update
                .ok_or(ConversionError::ExpectedSome("update"))?
                .try_into()?,
            state: value.state.map(TryInto::try_into).transpose()?,
        })
    }
}
