use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    channel::{
        channel_address, ChannelState, ChannelUpdate, PaymentApplier, UpdateApplier,
        UpdateDetails, PARTICIPANTS,
    },
    config::SyncConfig,
    error::{ChannelUpdateError, UpdateFailure},
    events::EventBus,
    protocol::ChannelLocks,
    sig::Signer,
    store::ChannelStore,
    types::{Address, U256},
    wire::{decode_frame, Inbox, MessageBus, SendOptions},
};

/// A node taking part in two-party channels.
///
/// Holds everything the synchronization protocol needs: the store with the
/// channel states, the bus to reach counterparties, the key used for
/// countersigning and the event bus connecting the inbound handler to waiting
/// outbound updates. Usually there is one `SyncClient` per process, shared
/// through an [Arc].
///
/// Note: An application will usually have only one store and one bus type,
/// thus using dynamic dispatch here doesn't make much sense.
#[derive(Debug)]
pub struct SyncClient<S, B, A = PaymentApplier>
where
    S: ChannelStore,
    B: MessageBus,
    A: UpdateApplier,
{
    pub(crate) store: S,
    pub(crate) bus: B,
    pub(crate) signer: Signer,
    pub(crate) applier: A,
    pub(crate) events: EventBus,
    pub(crate) locks: ChannelLocks,
    pub(crate) config: SyncConfig,
}

impl<S, B> SyncClient<S, B, PaymentApplier>
where
    S: ChannelStore,
    B: MessageBus,
{
    /// Creates a node running the bundled payment ledger.
    pub fn new(store: S, bus: B, signer: Signer, config: SyncConfig) -> Self {
        Self::with_applier(store, bus, signer, PaymentApplier, config)
    }
}

impl<S, B, A> SyncClient<S, B, A>
where
    S: ChannelStore,
    B: MessageBus,
    A: UpdateApplier,
{
    pub fn with_applier(store: S, bus: B, signer: Signer, applier: A, config: SyncConfig) -> Self {
        SyncClient {
            store,
            bus,
            signer,
            applier,
            events: EventBus::new(config.event_capacity),
            locks: ChannelLocks::default(),
            config,
        }
    }

    /// Public identifier of this node, the address of its signing key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Committed states and failed updates seen by this node. Subscribe
    /// through [EventBus::waiter].
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Opens a channel to `counterparty` by proposing the setup update.
    ///
    /// The local node becomes the initiator (participant 0). An empty state is
    /// stored first, so a failed setup can be proposed again.
    pub async fn setup(
        &self,
        counterparty: Address,
        timeout: u64,
        balances: [U256; PARTICIPANTS],
    ) -> Result<ChannelState, ChannelUpdateError> {
        let me = self.address();
        let addr = channel_address(me, counterparty, self.config.chain_id);
        let mut update = ChannelUpdate::new(
            addr,
            1,
            me,
            counterparty,
            UpdateDetails::Setup { timeout, balances },
        );

        let state = match self.load_channel(&update).await? {
            Some(state) => state,
            None => {
                let state = ChannelState::new(addr, [me, counterparty], self.config.chain_id);
                self.save_channel(&state, &update, None).await?;
                state
            }
        };

        self.sign_update(&mut update, &state)?;
        self.outbound(update).await
    }

    /// Proposes `details` as the next update of the channel at
    /// `channel_address`.
    pub async fn propose(
        &self,
        channel_address: Address,
        details: UpdateDetails,
    ) -> Result<ChannelState, ChannelUpdateError> {
        let me = self.address();
        let mut update = ChannelUpdate::new(channel_address, 0, me, me, details);
        let state = self
            .load_channel(&update)
            .await?
            .ok_or_else(|| ChannelUpdateError::new(UpdateFailure::ChannelNotFound, &update, None))?;

        update.nonce = state.latest_nonce + 1;
        update.to_identifier = state.counterparty(&me).ok_or_else(|| {
            ChannelUpdateError::new(UpdateFailure::ChannelNotFound, &update, Some(&state))
        })?;
        self.sign_update(&mut update, &state)?;
        self.outbound(update).await
    }

    /// Receive loop of the node: decodes every frame arriving in `inbox` and
    /// handles it on its own task. Returns once the inbox is closed.
    pub async fn run(self: Arc<Self>, mut inbox: Inbox)
    where
        S: 'static,
        B: 'static,
        A: 'static,
    {
        while let Some(frame) = inbox.recv().await {
            let msg = match decode_frame(&frame) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(node = %self.address(), error = %e, "dropping undecodable frame");
                    continue;
                }
            };

            let client = self.clone();
            tokio::spawn(async move {
                if let Err(e) = client.inbound(msg).await {
                    debug!(node = %client.address(), reason = %e.reason(), "inbound update failed: {e}");
                }
            });
        }
        debug!(node = %self.address(), "inbox closed");
    }

    pub(crate) fn send_options(&self) -> SendOptions {
        SendOptions {
            timeout: self.config.send_timeout,
            num_retries: 0,
        }
    }

    /// Adds our signature to `update` in our slot of `state`.
    pub(crate) fn sign_update(
        &self,
        update: &mut ChannelUpdate,
        state: &ChannelState,
    ) -> Result<(), ChannelUpdateError> {
        let me = self.address();
        let failure = |update: &ChannelUpdate, message: String| {
            ChannelUpdateError::new(UpdateFailure::BadSignatures { message }, update, Some(state))
        };
        let Some(part_idx) = state.part_idx(&me) else {
            return Err(failure(update, format!("{me} is not a participant")));
        };
        update
            .sign(part_idx, &self.signer)
            .map_err(|e| failure(update, e.to_string()))
    }

    pub(crate) async fn load_channel(
        &self,
        update: &ChannelUpdate,
    ) -> Result<Option<ChannelState>, ChannelUpdateError> {
        self.store
            .get_channel_state(&update.channel_address)
            .await
            .map_err(|e| {
                warn!(channel = %update.channel_address, error = %e, "could not load channel");
                ChannelUpdateError::new(UpdateFailure::ChannelNotFound, update, None)
            })
    }

    pub(crate) async fn save_channel(
        &self,
        state: &ChannelState,
        update: &ChannelUpdate,
        prior: Option<&ChannelState>,
    ) -> Result<(), ChannelUpdateError> {
        self.store.save_channel_state(state).await.map_err(|e| {
            ChannelUpdateError::new(
                UpdateFailure::SaveChannelFailed {
                    message: e.to_string(),
                },
                update,
                prior,
            )
        })
    }
}
