use tracing::{debug, info, warn};

use crate::{
    channel::{ChannelState, ChannelUpdate, UpdateApplier},
    error::{ChannelUpdateError, UpdateErrorReason, UpdateFailure},
    events::SyncEvent,
    messages::VectorMessage,
    store::ChannelStore,
    wire::MessageBus,
    SyncClient,
};

impl<S, B, A> SyncClient<S, B, A>
where
    S: ChannelStore,
    B: MessageBus,
    A: UpdateApplier,
{
    /// Drives a locally signed `update` until the counterparty has
    /// countersigned it and the dual-signed state is stored, or until it
    /// definitely failed.
    ///
    /// If the counterparty is exactly one update ahead it answers with
    /// `StaleUpdateNonce` and its latest update. That update is applied and
    /// stored, then the payload of `update` is proposed once more on top of
    /// it. A second rejection is returned as is.
    ///
    /// Proposals for the same channel must not run concurrently.
    #[tracing::instrument(
        name = "outbound",
        skip_all,
        fields(channel = %update.channel_address, nonce = update.nonce)
    )]
    pub async fn outbound(&self, update: ChannelUpdate) -> Result<ChannelState, ChannelUpdateError> {
        let mut update = update;
        let mut stored = self
            .load_channel(&update)
            .await?
            .ok_or_else(|| ChannelUpdateError::new(UpdateFailure::ChannelNotFound, &update, None))?;
        let mut resynced = false;

        loop {
            let error = match self.round_trip(&update, &stored).await? {
                SyncEvent::State(state) => {
                    info!(nonce = state.latest_nonce, "update is dual-signed");
                    return Ok(state);
                }
                SyncEvent::Error(error) => error,
            };

            if error.reason() != UpdateErrorReason::StaleUpdateNonce || resynced {
                warn!(reason = %error.reason(), "counterparty rejected update");
                return Err(ChannelUpdateError {
                    failure: error.failure,
                    update,
                    state: Some(stored),
                });
            }

            let theirs = error
                .counterparty_latest_update()
                .cloned()
                .ok_or_else(|| {
                    ChannelUpdateError::new(
                        UpdateFailure::StaleChannelNonceNoUpdate,
                        &update,
                        Some(&stored),
                    )
                })?;
            if theirs.nonce != update.nonce {
                warn!(theirs = theirs.nonce, "counterparty is too far away to resync");
                return Err(ChannelUpdateError::new(
                    UpdateFailure::StaleChannelNonce,
                    &update,
                    Some(&stored),
                ));
            }

            let synced = self.resync(&update, &theirs, &stored).await?;
            resynced = true;

            // The counterparty already holds our update, only its ack got
            // lost. Proposing the payload again would apply it twice.
            if theirs.commitment_hash() == update.commitment_hash() {
                info!("update was already dual-signed by the counterparty");
                return Ok(synced);
            }

            update = update.rebased(synced.latest_nonce + 1);
            self.sign_update(&mut update, &synced)?;
            debug!(nonce = update.nonce, "proposing again after resync");
            stored = synced;
        }
    }

    /// Sends `update` until the counterparty answers for it, at most
    /// `retry_attempts` times.
    async fn round_trip(
        &self,
        update: &ChannelUpdate,
        stored: &ChannelState,
    ) -> Result<SyncEvent, ChannelUpdateError> {
        let msg = VectorMessage::Channel {
            from: self.address(),
            update: update.clone(),
            latest_update: stored.latest_update.clone(),
        };

        let mut last_error = String::from("no attempt was made");
        for attempt in 1..=self.config.retry_attempts {
            // Subscribe before sending, a fast answer would be lost otherwise.
            let waiter = self.events.waiter(update.channel_address, update.nonce);
            match self
                .bus
                .send(&update.to_identifier, &msg, self.send_options())
                .await
            {
                Ok(()) => match waiter.wait(self.config.response_timeout).await {
                    Some(event) => return Ok(event),
                    None => last_error = "no answer from counterparty".into(),
                },
                Err(e) => last_error = e.to_string(),
            }

            warn!(attempt, error = %last_error, "update attempt failed");
            if attempt < self.config.retry_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(ChannelUpdateError::new(
            UpdateFailure::MessageFailed {
                message: last_error,
            },
            update,
            Some(stored),
        ))
    }

    /// Applies and stores the counterparty's `latest` update on top of
    /// `stored`.
    async fn resync(
        &self,
        update: &ChannelUpdate,
        latest: &ChannelUpdate,
        stored: &ChannelState,
    ) -> Result<ChannelState, ChannelUpdateError> {
        let _guard = self.locks.lock(update.channel_address).await;
        debug!(theirs = latest.nonce, "resyncing from counterparty's latest update");
        // The inbound handler may have stored a newer state in the meantime.
        let current = self.load_channel(update).await?;
        if let Some(current) = &current {
            let hash = latest.commitment_hash();
            if current.latest_update.as_ref().map(ChannelUpdate::commitment_hash) == Some(hash) {
                debug!("counterparty's latest update is already stored");
                return Ok(current.clone());
            }
        }
        let stored = current.as_ref().unwrap_or(stored);

        if !latest.commitment.is_final() {
            return Err(ChannelUpdateError::new(
                UpdateFailure::BadSignatures {
                    message: "update to resync from is not dual-signed".into(),
                },
                update,
                Some(stored),
            ));
        }
        latest
            .commitment
            .verify(latest.commitment_hash(), &stored.participants)
            .map_err(|e| {
                ChannelUpdateError::new(
                    UpdateFailure::BadSignatures {
                        message: e.to_string(),
                    },
                    update,
                    Some(stored),
                )
            })?;

        let synced = self.applier.apply(latest, stored).map_err(|e| {
            ChannelUpdateError::new(
                UpdateFailure::ApplyUpdateFailed {
                    message: e.to_string(),
                },
                update,
                Some(stored),
            )
        })?;
        self.save_channel(&synced, update, Some(stored)).await?;
        Ok(synced)
    }
}
