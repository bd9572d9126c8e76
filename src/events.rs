//! In-process hand-off between the inbound handler and waiting outbound
//! updates.
//!
//! The handler publishes every committed state and every error it sees. An
//! outbound update registers a [Waiter] for its `(channel, nonce)` before
//! sending, so the answer can not be missed, and receives at most one
//! matching event.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::{channel::ChannelState, error::ChannelUpdateError, types::Address};

/// Result an outbound update is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    State(ChannelState),
    Error(ChannelUpdateError),
}

/// Typed publish/subscribe streams owned by a single node.
#[derive(Debug, Clone)]
pub struct EventBus {
    states: broadcast::Sender<ChannelState>,
    errors: broadcast::Sender<ChannelUpdateError>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (states, _) = broadcast::channel(capacity.max(1));
        let (errors, _) = broadcast::channel(capacity.max(1));
        EventBus { states, errors }
    }

    /// Publishes a committed state. Not having any subscriber is fine.
    pub fn publish_state(&self, state: ChannelState) {
        let _ = self.states.send(state);
    }

    /// Publishes a failed update. Not having any subscriber is fine.
    pub fn publish_error(&self, error: ChannelUpdateError) {
        let _ = self.errors.send(error);
    }

    /// Subscribes to the result of the update with `nonce` on
    /// `channel_address`.
    pub fn waiter(&self, channel_address: Address, nonce: u64) -> Waiter {
        Waiter {
            channel_address,
            nonce,
            states: self.states.subscribe(),
            errors: self.errors.subscribe(),
        }
    }
}

/// One-shot subscription, dropping it ends the subscription.
#[derive(Debug)]
pub struct Waiter {
    channel_address: Address,
    nonce: u64,
    states: broadcast::Receiver<ChannelState>,
    errors: broadcast::Receiver<ChannelUpdateError>,
}

impl Waiter {
    /// First matching event, or `None` if none arrived within `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Option<SyncEvent> {
        tokio::time::timeout(timeout, self.next_match()).await.ok().flatten()
    }

    async fn next_match(&mut self) -> Option<SyncEvent> {
        let mut states_open = true;
        let mut errors_open = true;
        while states_open || errors_open {
            tokio::select! {
                res = self.states.recv(), if states_open => match res {
                    Ok(state) if self.matches_state(&state) => {
                        return Some(SyncEvent::State(state));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => states_open = false,
                },
                res = self.errors.recv(), if errors_open => match res {
                    Ok(error) if self.matches_error(&error) => {
                        return Some(SyncEvent::Error(error));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => errors_open = false,
                },
            }
        }
        None
    }

    fn matches_state(&self, state: &ChannelState) -> bool {
        state.channel_address == self.channel_address && state.latest_nonce == self.nonce
    }

    fn matches_error(&self, error: &ChannelUpdateError) -> bool {
        error.update.channel_address == self.channel_address && error.update.nonce == self.nonce
    }
}
