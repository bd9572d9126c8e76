use tracing::{debug, info, warn};

use crate::{
    channel::{ChannelState, ChannelUpdate, UpdateApplier, UpdateType},
    error::{ChannelUpdateError, UpdateFailure},
    messages::VectorMessage,
    store::ChannelStore,
    types::Address,
    wire::MessageBus,
    SyncClient,
};

impl<S, B, A> SyncClient<S, B, A>
where
    S: ChannelStore,
    B: MessageBus,
    A: UpdateApplier,
{
    /// Handles a message received from a counterparty.
    ///
    /// Error messages are answers to our own proposals and are handed to the
    /// waiting outbound driver. Channel messages carry either a proposal,
    /// which is validated, countersigned, stored and acknowledged, or the
    /// acknowledgement of one of our proposals, which is stored and
    /// published.
    ///
    /// A failing proposal is answered with the error. Every failure is
    /// published locally and returned. The store is never written for a
    /// rejected update.
    pub async fn inbound(&self, message: VectorMessage) -> Result<(), ChannelUpdateError> {
        let me = self.address();
        if message.sender() == me {
            debug!(node = %me, "ignoring message sent by ourselves");
            return Ok(());
        }

        match message {
            VectorMessage::Error { from, error } => {
                debug!(
                    node = %me,
                    peer = %from,
                    channel = %error.update.channel_address,
                    nonce = error.update.nonce,
                    reason = %error.reason(),
                    "received error"
                );
                self.events.publish_error(error);
                Ok(())
            }
            VectorMessage::Channel {
                from,
                update,
                latest_update,
            } => {
                let _guard = self.locks.lock(update.channel_address).await;
                match self.handle_update(&update, latest_update.as_ref()).await {
                    Ok(()) => Ok(()),
                    Err(error) => {
                        warn!(
                            node = %me,
                            channel = %update.channel_address,
                            nonce = update.nonce,
                            reason = %error.reason(),
                            "rejecting update: {}",
                            error.failure
                        );
                        if update.commitment.is_proposed() {
                            self.reply(from, VectorMessage::Error {
                                from: me,
                                error: error.clone(),
                            })
                            .await;
                        }
                        self.events.publish_error(error.clone());
                        Err(error)
                    }
                }
            }
        }
    }

    async fn handle_update(
        &self,
        update: &ChannelUpdate,
        their_latest: Option<&ChannelUpdate>,
    ) -> Result<(), ChannelUpdateError> {
        let fail = |failure: UpdateFailure, state: Option<&ChannelState>| {
            ChannelUpdateError::new(failure, update, state)
        };

        let prior = match self.load_channel(update).await? {
            Some(state) => state,
            // The counterparty opens a channel with us.
            None if update.update_type() == UpdateType::Setup => ChannelState::new(
                update.channel_address,
                [update.from_identifier, self.address()],
                self.config.chain_id,
            ),
            None => return Err(fail(UpdateFailure::ChannelNotFound, None)),
        };

        if update.commitment.num_signatures() == 0 {
            return Err(fail(
                UpdateFailure::BadSignatures {
                    message: "update is not signed".into(),
                },
                Some(&prior),
            ));
        }
        let bad_signatures = |e: &dyn core::fmt::Display| {
            fail(
                UpdateFailure::BadSignatures {
                    message: e.to_string(),
                },
                Some(&prior),
            )
        };
        update
            .commitment
            .verify(update.commitment_hash(), &prior.participants)
            .map_err(|e| bad_signatures(&e))?;
        if let Some(latest) = their_latest {
            latest
                .commitment
                .verify(latest.commitment_hash(), &prior.participants)
                .map_err(|e| bad_signatures(&e))?;
        }

        let stored_nonce = prior.latest_nonce;
        if update.nonce <= stored_nonce {
            return Err(fail(
                UpdateFailure::StaleUpdateNonce {
                    counterparty_latest_update: prior.latest_update.clone(),
                },
                Some(&prior),
            ));
        }

        let prior = match update.nonce - stored_nonce {
            1 => prior,
            2 => {
                // We missed exactly one update, the counterparty sent it
                // along as its latest one.
                let Some(latest) = their_latest else {
                    return Err(fail(UpdateFailure::StaleChannelNonceNoUpdate, Some(&prior)));
                };
                if !latest.commitment.is_final() {
                    return Err(fail(
                        UpdateFailure::BadSignatures {
                            message: "update to resync from is not dual-signed".into(),
                        },
                        Some(&prior),
                    ));
                }
                debug!(
                    channel = %update.channel_address,
                    theirs = latest.nonce,
                    "resyncing before applying update"
                );
                self.apply(update, latest, &prior)?
            }
            _ => return Err(fail(UpdateFailure::StaleChannelNonce, Some(&prior))),
        };

        let next = self.apply(update, update, &prior)?;

        if update.commitment.is_proposed() {
            let mut signed = update.clone();
            self.sign_update(&mut signed, &prior)?;
            let next = next.with_latest_update(signed.clone());
            self.save_channel(&next, update, Some(&prior)).await?;
            debug!(
                channel = %update.channel_address,
                nonce = update.nonce,
                "countersigned update"
            );

            self.reply(
                update.from_identifier,
                VectorMessage::Channel {
                    from: self.address(),
                    update: signed,
                    latest_update: prior.latest_update.clone(),
                },
            )
            .await;
        } else {
            self.save_channel(&next, update, Some(&prior)).await?;
            info!(
                channel = %update.channel_address,
                nonce = update.nonce,
                "counterparty countersigned our update"
            );
            self.events.publish_state(next);
        }
        Ok(())
    }

    /// Applies `applied` on top of `prior`, failures are reported for
    /// `update`.
    fn apply(
        &self,
        update: &ChannelUpdate,
        applied: &ChannelUpdate,
        prior: &ChannelState,
    ) -> Result<ChannelState, ChannelUpdateError> {
        self.applier.apply(applied, prior).map_err(|e| {
            ChannelUpdateError::new(
                UpdateFailure::ApplyUpdateFailed {
                    message: e.to_string(),
                },
                update,
                Some(prior),
            )
        })
    }

    /// Sends an answer once. A lost answer is recovered by the proposer
    /// retrying, so failures are only logged.
    async fn reply(&self, to: Address, msg: VectorMessage) {
        if let Err(e) = self.bus.send(&to, &msg, self.send_options()).await {
            warn!(node = %self.address(), peer = %to, error = %e, "could not send reply");
        }
    }
}
