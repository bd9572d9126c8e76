//! Applying updates to a payment channel.
//!
//! The synchronization protocol treats [UpdateApplier] as a pure function and
//! never looks into update payloads except for the setup tag. [PaymentApplier]
//! is the ledger used by this crate: two balances, transfers between them and
//! a final close.

use super::{ChannelState, ChannelUpdate, UpdateDetails};
use crate::types::{Address, U256};

/// Computes the state following `prior` after `update`.
///
/// Must be deterministic and free of I/O: both participants apply the same
/// update independently and must end up with identical states.
pub trait UpdateApplier: Send + Sync {
    fn apply(&self, update: &ChannelUpdate, prior: &ChannelState)
        -> Result<ChannelState, ApplyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("update is for channel {update}, state is for {state}")]
    InvalidChannelAddress { update: Address, state: Address },
    #[error("update nonce {update} does not follow state nonce {state}")]
    InvalidNonce { update: u64, state: u64 },
    #[error("current state is final")]
    CurrentStateIsFinal,
    #[error("{0} is not a participant of the channel")]
    NotAParticipant(Address),
    #[error("update must be sent to the other participant")]
    InvalidRecipient,
    #[error("setup is only valid as the first update")]
    AlreadySetUp,
    #[error("channel is not set up, yet")]
    NotSetUp,
    #[error("balance of {available} is insufficient for a transfer of {amount}")]
    InsufficientBalance { available: U256, amount: U256 },
    #[error("balance overflow")]
    Overflow,
}

/// [UpdateApplier] for the two-party payment ledger.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaymentApplier;

impl PaymentApplier {
    fn check_valid_transition(
        &self,
        update: &ChannelUpdate,
        prior: &ChannelState,
    ) -> Result<usize, ApplyError> {
        if update.channel_address != prior.channel_address {
            return Err(ApplyError::InvalidChannelAddress {
                update: update.channel_address,
                state: prior.channel_address,
            });
        }
        if prior.is_final {
            return Err(ApplyError::CurrentStateIsFinal);
        }
        if update.nonce != prior.latest_nonce + 1 {
            return Err(ApplyError::InvalidNonce {
                update: update.nonce,
                state: prior.latest_nonce,
            });
        }
        let from_idx = prior
            .part_idx(&update.from_identifier)
            .ok_or(ApplyError::NotAParticipant(update.from_identifier))?;
        if prior.participants[1 - from_idx] != update.to_identifier {
            return Err(ApplyError::InvalidRecipient);
        }
        Ok(from_idx)
    }
}

impl UpdateApplier for PaymentApplier {
    fn apply(
        &self,
        update: &ChannelUpdate,
        prior: &ChannelState,
    ) -> Result<ChannelState, ApplyError> {
        let from_idx = self.check_valid_transition(update, prior)?;
        let is_set_up = prior.latest_update.is_some();

        let mut next = prior.clone();
        match &update.details {
            UpdateDetails::Setup { timeout, balances } => {
                if is_set_up {
                    return Err(ApplyError::AlreadySetUp);
                }
                next.timeout = *timeout;
                next.balances = *balances;
                if next.total_balance().is_none() {
                    return Err(ApplyError::Overflow);
                }
            }
            UpdateDetails::Transfer { amount } => {
                if !is_set_up {
                    return Err(ApplyError::NotSetUp);
                }
                let to_idx = 1 - from_idx;
                let available = prior.balances[from_idx];
                next.balances[from_idx] =
                    available
                        .checked_sub(*amount)
                        .ok_or(ApplyError::InsufficientBalance {
                            available,
                            amount: *amount,
                        })?;
                next.balances[to_idx] = prior.balances[to_idx]
                    .checked_add(*amount)
                    .ok_or(ApplyError::Overflow)?;
            }
            UpdateDetails::Close => {
                if !is_set_up {
                    return Err(ApplyError::NotSetUp);
                }
                next.is_final = true;
            }
        }

        Ok(next.with_latest_update(update.clone()))
    }
}
