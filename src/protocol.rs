//! The update synchronization protocol.
//!
//! An update travels from the proposer's [outbound][crate::SyncClient::outbound]
//! driver to the counterparty's [inbound][crate::SyncClient::inbound] handler,
//! which countersigns and answers with the dual-signed update (or an error).
//! The answer is processed by the proposer's inbound handler and handed to the
//! waiting driver through the [EventBus][crate::events::EventBus].
//!
//! Nonces decide what happens with an update: the receiver accepts the update
//! directly following its own latest one, resyncs over a gap of exactly one
//! missed update and rejects everything else.

mod inbound;
mod locks;
mod outbound;

pub(crate) use locks::ChannelLocks;

#[cfg(test)]
mod tests;
