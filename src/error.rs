//! Errors reported by the synchronization protocol.

use core::fmt::Display;

use crate::channel::{ChannelState, ChannelUpdate};

/// Closed set of reasons an update can fail for.
///
/// This is the code sent over the wire, the context travels next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateErrorReason {
    ChannelNotFound,
    BadSignatures,
    StaleUpdateNonce,
    StaleChannelNonce,
    StaleChannelNonceNoUpdate,
    ApplyUpdateFailed,
    SaveChannelFailed,
    MessageFailed,
}

impl Display for UpdateErrorReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            UpdateErrorReason::ChannelNotFound => "ChannelNotFound",
            UpdateErrorReason::BadSignatures => "BadSignatures",
            UpdateErrorReason::StaleUpdateNonce => "StaleUpdateNonce",
            UpdateErrorReason::StaleChannelNonce => "StaleChannelNonce",
            UpdateErrorReason::StaleChannelNonceNoUpdate => "StaleChannelNonceNoUpdate",
            UpdateErrorReason::ApplyUpdateFailed => "ApplyUpdateFailed",
            UpdateErrorReason::SaveChannelFailed => "SaveChannelFailed",
            UpdateErrorReason::MessageFailed => "MessageFailed",
        };
        f.write_str(name)
    }
}

/// Reason of a failed update together with the context that reason needs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateFailure {
    #[error("channel not found")]
    ChannelNotFound,
    #[error("bad signatures: {message}")]
    BadSignatures { message: String },
    /// The receiver is already at or beyond the update's nonce. Carries the
    /// receiver's latest update so the proposer can resync.
    #[error("update nonce is stale")]
    StaleUpdateNonce {
        counterparty_latest_update: Option<ChannelUpdate>,
    },
    /// Too far apart to resync from a single update, needs a restore.
    #[error("channel nonce is stale")]
    StaleChannelNonce,
    #[error("channel nonce is stale and no update to resync from was provided")]
    StaleChannelNonceNoUpdate,
    #[error("could not apply update: {message}")]
    ApplyUpdateFailed { message: String },
    #[error("could not save channel: {message}")]
    SaveChannelFailed { message: String },
    #[error("message failed: {message}")]
    MessageFailed { message: String },
}

impl UpdateFailure {
    pub fn reason(&self) -> UpdateErrorReason {
        match self {
            UpdateFailure::ChannelNotFound => UpdateErrorReason::ChannelNotFound,
            UpdateFailure::BadSignatures { .. } => UpdateErrorReason::BadSignatures,
            UpdateFailure::StaleUpdateNonce { .. } => UpdateErrorReason::StaleUpdateNonce,
            UpdateFailure::StaleChannelNonce => UpdateErrorReason::StaleChannelNonce,
            UpdateFailure::StaleChannelNonceNoUpdate => {
                UpdateErrorReason::StaleChannelNonceNoUpdate
            }
            UpdateFailure::ApplyUpdateFailed { .. } => UpdateErrorReason::ApplyUpdateFailed,
            UpdateFailure::SaveChannelFailed { .. } => UpdateErrorReason::SaveChannelFailed,
            UpdateFailure::MessageFailed { .. } => UpdateErrorReason::MessageFailed,
        }
    }

    /// Free form part of the context, empty for reasons without one.
    pub fn message(&self) -> &str {
        match self {
            UpdateFailure::BadSignatures { message }
            | UpdateFailure::ApplyUpdateFailed { message }
            | UpdateFailure::SaveChannelFailed { message }
            | UpdateFailure::MessageFailed { message } => message,
            _ => "",
        }
    }

    /// Rebuilds a failure from its wire representation.
    pub fn from_parts(
        reason: UpdateErrorReason,
        message: String,
        counterparty_latest_update: Option<ChannelUpdate>,
    ) -> Self {
        match reason {
            UpdateErrorReason::ChannelNotFound => UpdateFailure::ChannelNotFound,
            UpdateErrorReason::BadSignatures => UpdateFailure::BadSignatures { message },
            UpdateErrorReason::StaleUpdateNonce => UpdateFailure::StaleUpdateNonce {
                counterparty_latest_update,
            },
            UpdateErrorReason::StaleChannelNonce => UpdateFailure::StaleChannelNonce,
            UpdateErrorReason::StaleChannelNonceNoUpdate => {
                UpdateFailure::StaleChannelNonceNoUpdate
            }
            UpdateErrorReason::ApplyUpdateFailed => UpdateFailure::ApplyUpdateFailed { message },
            UpdateErrorReason::SaveChannelFailed => UpdateFailure::SaveChannelFailed { message },
            UpdateErrorReason::MessageFailed => UpdateFailure::MessageFailed { message },
        }
    }
}

/// A failed channel update.
///
/// Carries the update that triggered it and the channel state known at the
/// time, so a caller can decide whether to retry, restore or give up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{failure} (channel {}, nonce {})", .update.channel_address, .update.nonce)]
pub struct ChannelUpdateError {
    pub failure: UpdateFailure,
    pub update: ChannelUpdate,
    pub state: Option<ChannelState>,
}

impl ChannelUpdateError {
    pub fn new(
        failure: UpdateFailure,
        update: &ChannelUpdate,
        state: Option<&ChannelState>,
    ) -> Self {
        ChannelUpdateError {
            failure,
            update: update.clone(),
            state: state.cloned(),
        }
    }

    pub fn reason(&self) -> UpdateErrorReason {
        self.failure.reason()
    }

    pub fn counterparty_latest_update(&self) -> Option<&ChannelUpdate> {
        match &self.failure {
            UpdateFailure::StaleUpdateNonce {
                counterparty_latest_update,
            } => counterparty_latest_update.as_ref(),
            _ => None,
        }
    }
}
