use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    channel::{
        channel_address, ChannelState, ChannelUpdate, PartIdx, PaymentApplier, UpdateApplier,
        UpdateDetails,
    },
    config::SyncConfig,
    error::{ChannelUpdateError, UpdateErrorReason, UpdateFailure},
    events::SyncEvent,
    messages::VectorMessage,
    sig::Signer,
    store::{ChannelStore, MemoryStore},
    types::{Address, U256},
    wire::{
        decode_frame, encode_frame, BytesBus, Inbox, LocalNetwork, MemoryBus,
        ProtoBufEncodingLayer,
    },
    SyncClient,
};

type Node = Arc<SyncClient<MemoryStore, ProtoBufEncodingLayer<MemoryBus>>>;

const CHAIN_ID: u64 = 1337;
/// Secret keys of alice (participant 0) and bob (participant 1).
const KEYS: [u8; 2] = [1, 2];
const STRANGER: u8 = 3;

fn config() -> SyncConfig {
    SyncConfig {
        chain_id: CHAIN_ID,
        retry_attempts: 3,
        retry_delay: Duration::from_millis(10),
        response_timeout: Duration::from_millis(500),
        send_timeout: Duration::from_millis(100),
        event_capacity: 64,
    }
}

fn signer(key: u8) -> Signer {
    Signer::from_secret_bytes(&[key; 32]).unwrap()
}

fn address(key: u8) -> Address {
    signer(key).address()
}

fn channel() -> Address {
    channel_address(address(KEYS[0]), address(KEYS[1]), CHAIN_ID)
}

fn transfer(amount: u64) -> UpdateDetails {
    UpdateDetails::Transfer {
        amount: U256::from(amount),
    }
}

/// Update proposed and signed by participant `from` on top of `state`.
fn proposal(state: &ChannelState, from: PartIdx, details: UpdateDetails) -> ChannelUpdate {
    let mut update = ChannelUpdate::new(
        state.channel_address,
        state.latest_nonce + 1,
        state.participants[from],
        state.participants[1 - from],
        details,
    );
    update.sign(from, &signer(KEYS[from])).unwrap();
    update
}

fn countersigned(mut update: ChannelUpdate, state: &ChannelState) -> ChannelUpdate {
    let idx = 1 - state.part_idx(&update.from_identifier).unwrap();
    update.sign(idx, &signer(KEYS[idx])).unwrap();
    update
}

/// Agreed upon states with the nonces `0..=len`. Nonce 1 sets the channel up
/// with 100 for each, afterwards the participants alternate transferring 1,
/// alice proposes the even nonces.
fn history(len: u64) -> Vec<ChannelState> {
    let mut states = vec![ChannelState::new(
        channel(),
        [address(KEYS[0]), address(KEYS[1])],
        CHAIN_ID,
    )];
    for nonce in 1..=len {
        let prior = &states[states.len() - 1];
        let (from, details) = match nonce {
            1 => (
                0,
                UpdateDetails::Setup {
                    timeout: 60,
                    balances: [U256::from(100u64), U256::from(100u64)],
                },
            ),
            n => ((n % 2) as usize, transfer(1)),
        };
        let update = countersigned(proposal(prior, from, details), prior);
        let next = PaymentApplier.apply(&update, prior).unwrap();
        states.push(next);
    }
    states
}

fn node(network: &LocalNetwork, key: u8) -> (Node, Inbox) {
    node_with(network, key, config())
}

fn node_with(network: &LocalNetwork, key: u8, config: SyncConfig) -> (Node, Inbox) {
    let signer = signer(key);
    let (bus, inbox) = network.register(signer.address());
    let node = SyncClient::new(
        MemoryStore::new(),
        ProtoBufEncodingLayer::new(bus),
        signer,
        config,
    );
    (Arc::new(node), inbox)
}

fn start(node: &Node, inbox: Inbox) {
    tokio::spawn(node.clone().run(inbox));
}

async fn seed(node: &Node, state: &ChannelState) {
    node.store().save_channel_state(state).await.unwrap();
}

async fn stored(node: &Node) -> Option<ChannelState> {
    node.store().get_channel_state(&channel()).await.unwrap()
}

/// Alice and bob with their receive loops running, both at `state`.
async fn running_pair(state: Option<&ChannelState>) -> (LocalNetwork, Node, Node) {
    let network = LocalNetwork::new();
    let (alice, alice_inbox) = node(&network, KEYS[0]);
    let (bob, bob_inbox) = node(&network, KEYS[1]);
    if let Some(state) = state {
        seed(&alice, state).await;
        seed(&bob, state).await;
    }
    start(&alice, alice_inbox);
    start(&bob, bob_inbox);
    (network, alice, bob)
}

/// Participant `idx` at `state` without a receive loop. The returned inbox
/// collects whatever it sends to the other participant.
async fn receiver(idx: PartIdx, state: Option<&ChannelState>) -> (Node, Inbox) {
    let network = LocalNetwork::new();
    let (_other_bus, other_inbox) = network.register(address(KEYS[1 - idx]));
    let (node, _inbox) = node(&network, KEYS[idx]);
    if let Some(state) = state {
        seed(&node, state).await;
    }
    (node, other_inbox)
}

/// Alice at `state` with her receive loop running, talking to a bob played
/// by `answer`. For the n-th frame alice sends, `answer` gets `n` and the
/// update and returns the messages bob sends back, each after its delay.
/// Also returns the number of frames bob received so far.
async fn scripted_bob<F>(
    state: &ChannelState,
    config: SyncConfig,
    mut answer: F,
) -> (Node, Arc<AtomicUsize>)
where
    F: FnMut(usize, ChannelUpdate) -> Vec<(Duration, VectorMessage)> + Send + 'static,
{
    let network = LocalNetwork::new();
    let (alice, alice_inbox) = node_with(&network, KEYS[0], config);
    let (bob_bus, mut bob_inbox) = network.register(address(KEYS[1]));
    seed(&alice, state).await;
    start(&alice, alice_inbox);

    let frames = Arc::new(AtomicUsize::new(0));
    let received = frames.clone();
    let alice_address = alice.address();
    tokio::spawn(async move {
        while let Some(frame) = bob_inbox.recv().await {
            let VectorMessage::Channel { update, .. } = decode_frame(&frame).unwrap() else {
                continue;
            };
            let n = received.fetch_add(1, Ordering::SeqCst);
            for (delay, msg) in answer(n, update) {
                tokio::time::sleep(delay).await;
                bob_bus
                    .send_bytes(&alice_address, &encode_frame(&msg).unwrap())
                    .await
                    .unwrap();
            }
        }
    });
    (alice, frames)
}

/// Bob's rejection of `update` because he is at `latest` already.
fn stale(update: &ChannelUpdate, latest: Option<ChannelUpdate>) -> VectorMessage {
    VectorMessage::Error {
        from: address(KEYS[1]),
        error: ChannelUpdateError::new(
            UpdateFailure::StaleUpdateNonce {
                counterparty_latest_update: latest,
            },
            update,
            None,
        ),
    }
}

fn message(from: PartIdx, update: ChannelUpdate, latest_update: Option<ChannelUpdate>) -> VectorMessage {
    VectorMessage::Channel {
        from: address(KEYS[from]),
        update,
        latest_update,
    }
}

fn reply(inbox: &mut Inbox) -> VectorMessage {
    decode_frame(&inbox.try_recv().unwrap()).unwrap()
}

fn expect_error_reply(inbox: &mut Inbox) -> ChannelUpdateError {
    match reply(inbox) {
        VectorMessage::Error { error, .. } => error,
        other => panic!("expected an error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn setup_opens_the_channel_on_both_sides() {
    let (_network, alice, bob) = running_pair(None).await;
    let balances = [U256::from(100u64), U256::from(50u64)];

    let state = alice.setup(bob.address(), 60, balances).await.unwrap();

    assert_eq!(state.channel_address, channel());
    assert_eq!(state.participants, [alice.address(), bob.address()]);
    assert_eq!(state.latest_nonce, 1);
    assert_eq!(state.balances, balances);
    assert!(state.latest_update.as_ref().unwrap().commitment.is_final());
    assert_eq!(stored(&alice).await.as_ref(), Some(&state));
    assert_eq!(stored(&bob).await.as_ref(), Some(&state));
}

#[tokio::test]
async fn both_participants_can_propose() {
    let (_network, alice, bob) = running_pair(None).await;
    alice
        .setup(bob.address(), 60, [U256::from(100u64), U256::from(50u64)])
        .await
        .unwrap();

    alice.propose(channel(), transfer(10)).await.unwrap();
    let state = bob.propose(channel(), transfer(25)).await.unwrap();

    assert_eq!(state.latest_nonce, 3);
    assert_eq!(state.balances, [U256::from(115u64), U256::from(35u64)]);
    assert_eq!(stored(&alice).await, stored(&bob).await);
}

#[tokio::test]
async fn proposal_is_countersigned_and_stored_by_both() {
    let states = history(5);
    let (_network, alice, bob) = running_pair(Some(&states[5])).await;

    let state = alice.propose(channel(), transfer(10)).await.unwrap();

    assert_eq!(state.latest_nonce, 6);
    assert_eq!(state.balances, [U256::from(90u64), U256::from(110u64)]);
    let update = state.latest_update.as_ref().unwrap();
    assert!(update.commitment.is_final());
    update
        .commitment
        .verify(update.commitment_hash(), &state.participants)
        .unwrap();
    assert_eq!(stored(&alice).await.as_ref(), Some(&state));
    assert_eq!(stored(&bob).await.as_ref(), Some(&state));
}

#[tokio::test]
async fn proposer_resyncs_when_counterparty_is_one_ahead() {
    let states = history(6);
    let network = LocalNetwork::new();
    let (alice, alice_inbox) = node(&network, KEYS[0]);
    let (bob, bob_inbox) = node(&network, KEYS[1]);
    seed(&alice, &states[5]).await;
    seed(&bob, &states[6]).await;
    start(&alice, alice_inbox);
    start(&bob, bob_inbox);

    let state = alice.propose(channel(), transfer(2)).await.unwrap();

    // Update 6 from bob's copy, then ours on top of it.
    assert_eq!(state.latest_nonce, 7);
    assert_eq!(state.balances, [U256::from(97u64), U256::from(103u64)]);
    let update = state.latest_update.as_ref().unwrap();
    assert_eq!(update.from_identifier, alice.address());
    assert_eq!(update.details, transfer(2));
    assert_eq!(stored(&alice).await.as_ref(), Some(&state));
    assert_eq!(stored(&bob).await.as_ref(), Some(&state));
}

#[tokio::test]
async fn lost_ack_is_recovered_without_applying_twice() {
    // Bob countersigned alice's transfer at nonce 6, the ack never arrived.
    let states = history(6);
    let network = LocalNetwork::new();
    let (alice, alice_inbox) = node(&network, KEYS[0]);
    let (bob, bob_inbox) = node(&network, KEYS[1]);
    seed(&alice, &states[5]).await;
    seed(&bob, &states[6]).await;
    start(&alice, alice_inbox);
    start(&bob, bob_inbox);
    let bob_writes = bob.store().writes();

    let state = alice.propose(channel(), transfer(1)).await.unwrap();

    assert_eq!(state, states[6]);
    assert_eq!(stored(&alice).await, Some(states[6].clone()));
    assert_eq!(bob.store().writes(), bob_writes);
}

#[tokio::test]
async fn proposer_gives_up_when_counterparty_is_far_ahead() {
    let states = history(7);
    let network = LocalNetwork::new();
    let (alice, alice_inbox) = node(&network, KEYS[0]);
    let (bob, bob_inbox) = node(&network, KEYS[1]);
    seed(&alice, &states[5]).await;
    seed(&bob, &states[7]).await;
    start(&alice, alice_inbox);
    start(&bob, bob_inbox);

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::StaleChannelNonce);
    assert_eq!(err.update.nonce, 6);
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
    assert_eq!(stored(&bob).await, Some(states[7].clone()));
}

#[tokio::test]
async fn rejection_reason_reaches_the_proposer() {
    let states = history(5);
    let (_network, alice, bob) = running_pair(Some(&states[5])).await;
    bob.store().fail_next_saves(1);

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::SaveChannelFailed);
    assert_eq!(err.state.as_ref(), Some(&states[5]));
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
    assert_eq!(stored(&bob).await, Some(states[5].clone()));
}

#[tokio::test]
async fn unknown_channel_is_rejected_by_proposer() {
    let (_network, alice, _bob) = running_pair(None).await;

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();
    assert_eq!(err.failure, UpdateFailure::ChannelNotFound);
}

#[tokio::test]
async fn transport_failures_are_retried() {
    let states = history(5);
    let (_network, alice, bob) = running_pair(Some(&states[5])).await;
    alice.bus().bus.drop_next(2);

    let state = alice.propose(channel(), transfer(3)).await.unwrap();

    assert_eq!(state.latest_nonce, 6);
    assert_eq!(stored(&bob).await.as_ref(), Some(&state));
}

#[tokio::test]
async fn exhausted_retries_fail_the_update() {
    let states = history(5);
    let (_network, alice, bob) = running_pair(Some(&states[5])).await;
    alice.bus().bus.drop_next(10);

    let err = alice.propose(channel(), transfer(3)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::MessageFailed);
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
    assert_eq!(stored(&bob).await, Some(states[5].clone()));
}

#[tokio::test(start_paused = true)]
async fn silent_counterparty_times_out_every_attempt() {
    let states = history(5);
    let network = LocalNetwork::new();
    let (alice, alice_inbox) = node(&network, KEYS[0]);
    // Bob is reachable but never processes anything.
    let (_bob_bus, mut bob_inbox) = network.register(address(KEYS[1]));
    seed(&alice, &states[5]).await;
    start(&alice, alice_inbox);

    let err = alice.propose(channel(), transfer(3)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::MessageFailed);
    let mut frames = 0;
    while bob_inbox.try_recv().is_ok() {
        frames += 1;
    }
    assert_eq!(frames, config().retry_attempts);
}

#[tokio::test]
async fn proposal_is_countersigned_and_acknowledged() {
    let states = history(5);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    let update = proposal(&states[5], 0, transfer(4));

    bob.inbound(message(0, update.clone(), states[5].latest_update.clone()))
        .await
        .unwrap();

    let state = stored(&bob).await.unwrap();
    assert_eq!(state.latest_nonce, 6);
    assert_eq!(state.balances, [U256::from(96u64), U256::from(104u64)]);
    match reply(&mut alice_inbox) {
        VectorMessage::Channel {
            from,
            update: ack,
            latest_update,
        } => {
            assert_eq!(from, bob.address());
            assert_eq!(ack.commitment_hash(), update.commitment_hash());
            assert!(ack.commitment.is_final());
            ack.commitment
                .verify(ack.commitment_hash(), &state.participants)
                .unwrap();
            assert_eq!(state.latest_update, Some(ack));
            assert_eq!(latest_update, states[5].latest_update);
        }
        other => panic!("expected the countersigned update, got {other:?}"),
    }
}

#[tokio::test]
async fn ack_is_stored_and_published() {
    let states = history(5);
    let (alice, mut bob_inbox) = receiver(0, Some(&states[5])).await;
    let ack = countersigned(proposal(&states[5], 0, transfer(4)), &states[5]);
    let waiter = alice.events().waiter(channel(), 6);

    alice
        .inbound(message(1, ack.clone(), states[5].latest_update.clone()))
        .await
        .unwrap();

    let state = stored(&alice).await.unwrap();
    assert_eq!(state.latest_update, Some(ack));
    assert_eq!(
        waiter.wait(Duration::from_secs(1)).await,
        Some(SyncEvent::State(state))
    );
    assert!(bob_inbox.try_recv().is_err());
}

#[tokio::test]
async fn setup_from_counterparty_creates_the_channel() {
    let states = history(0);
    let (bob, mut alice_inbox) = receiver(1, None).await;
    let setup = proposal(
        &states[0],
        0,
        UpdateDetails::Setup {
            timeout: 30,
            balances: [U256::from(5u64), U256::from(0u64)],
        },
    );

    bob.inbound(message(0, setup, None)).await.unwrap();

    let state = stored(&bob).await.unwrap();
    assert_eq!(state.participants, [address(KEYS[0]), bob.address()]);
    assert_eq!(state.chain_id, CHAIN_ID);
    assert_eq!(state.latest_nonce, 1);
    assert_eq!(state.timeout, 30);
    assert!(matches!(
        reply(&mut alice_inbox),
        VectorMessage::Channel {
            latest_update: None,
            ..
        }
    ));
}

#[tokio::test]
async fn update_for_unknown_channel_is_rejected() {
    let states = history(1);
    let (bob, mut alice_inbox) = receiver(1, None).await;

    let err = bob
        .inbound(message(0, proposal(&states[1], 0, transfer(1)), None))
        .await
        .unwrap_err();

    assert_eq!(err.failure, UpdateFailure::ChannelNotFound);
    assert_eq!(err.state, None);
    assert_eq!(bob.store().writes(), 0);
    assert_eq!(expect_error_reply(&mut alice_inbox), err);
}

#[tokio::test]
async fn update_at_stored_nonce_is_stale() {
    let states = history(5);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    let writes = bob.store().writes();

    let err = bob
        .inbound(message(
            0,
            proposal(&states[4], 0, transfer(7)),
            states[4].latest_update.clone(),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::StaleUpdateNonce);
    assert_eq!(
        err.counterparty_latest_update(),
        states[5].latest_update.as_ref()
    );
    assert_eq!(bob.store().writes(), writes);
    assert_eq!(stored(&bob).await, Some(states[5].clone()));
    assert_eq!(expect_error_reply(&mut alice_inbox), err);
}

#[tokio::test]
async fn receiver_resyncs_over_a_single_missed_update() {
    let states = history(6);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    let update = proposal(&states[6], 0, transfer(3));

    bob.inbound(message(0, update, states[6].latest_update.clone()))
        .await
        .unwrap();

    let state = stored(&bob).await.unwrap();
    assert_eq!(state.latest_nonce, 7);
    // 6 moved 1, 7 moved 3, both from alice.
    assert_eq!(state.balances, [U256::from(96u64), U256::from(104u64)]);
    match reply(&mut alice_inbox) {
        VectorMessage::Channel { latest_update, .. } => {
            assert_eq!(latest_update, states[6].latest_update);
        }
        other => panic!("expected the countersigned update, got {other:?}"),
    }
}

#[tokio::test]
async fn gap_of_two_without_latest_update_is_rejected() {
    let states = history(6);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    let writes = bob.store().writes();

    let err = bob
        .inbound(message(0, proposal(&states[6], 0, transfer(3)), None))
        .await
        .unwrap_err();

    assert_eq!(err.failure, UpdateFailure::StaleChannelNonceNoUpdate);
    assert_eq!(bob.store().writes(), writes);
    assert_eq!(expect_error_reply(&mut alice_inbox).reason(), err.reason());
}

#[tokio::test]
async fn larger_gaps_are_rejected() {
    let states = history(7);
    let (bob, _alice_inbox) = receiver(1, Some(&states[5])).await;

    let err = bob
        .inbound(message(
            0,
            proposal(&states[7], 0, transfer(1)),
            states[7].latest_update.clone(),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.failure, UpdateFailure::StaleChannelNonce);
    assert_eq!(stored(&bob).await, Some(states[5].clone()));
}

#[tokio::test]
async fn signature_of_a_stranger_is_rejected() {
    let states = history(5);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    let writes = bob.store().writes();
    let mut update = ChannelUpdate::new(
        channel(),
        6,
        address(KEYS[0]),
        bob.address(),
        transfer(50),
    );
    update.sign(0, &signer(STRANGER)).unwrap();

    let err = bob.inbound(message(0, update, None)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::BadSignatures);
    assert_eq!(bob.store().writes(), writes);
    assert_eq!(stored(&bob).await, Some(states[5].clone()));
    assert_eq!(
        expect_error_reply(&mut alice_inbox).reason(),
        UpdateErrorReason::BadSignatures
    );
}

#[tokio::test]
async fn tampered_latest_update_is_rejected() {
    let states = history(6);
    let (bob, _alice_inbox) = receiver(1, Some(&states[5])).await;
    let mut latest = states[6].latest_update.clone().unwrap();
    latest.details = transfer(90);

    let err = bob
        .inbound(message(0, proposal(&states[6], 0, transfer(1)), Some(latest)))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::BadSignatures);
    assert_eq!(stored(&bob).await, Some(states[5].clone()));
}

#[tokio::test]
async fn unsigned_update_is_rejected() {
    let states = history(5);
    let (bob, _alice_inbox) = receiver(1, Some(&states[5])).await;
    let update = ChannelUpdate::new(channel(), 6, address(KEYS[0]), bob.address(), transfer(1));

    let err = bob.inbound(message(0, update, None)).await.unwrap_err();
    assert_eq!(err.reason(), UpdateErrorReason::BadSignatures);
}

#[tokio::test]
async fn invalid_transition_is_rejected() {
    let states = history(5);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    let writes = bob.store().writes();

    let err = bob
        .inbound(message(0, proposal(&states[5], 0, transfer(1000)), None))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::ApplyUpdateFailed);
    assert_eq!(bob.store().writes(), writes);
    assert_eq!(
        expect_error_reply(&mut alice_inbox).reason(),
        UpdateErrorReason::ApplyUpdateFailed
    );
}

#[tokio::test]
async fn failed_save_is_reported() {
    let states = history(5);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    bob.store().fail_next_saves(1);

    let err = bob
        .inbound(message(0, proposal(&states[5], 0, transfer(1)), None))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::SaveChannelFailed);
    assert_eq!(stored(&bob).await, Some(states[5].clone()));
    assert_eq!(
        expect_error_reply(&mut alice_inbox).reason(),
        UpdateErrorReason::SaveChannelFailed
    );
}

#[tokio::test]
async fn rejected_ack_is_not_answered() {
    let states = history(6);
    let (alice, mut bob_inbox) = receiver(0, Some(&states[6])).await;
    let ack = states[6].latest_update.clone().unwrap();
    let waiter = alice.events().waiter(channel(), 6);

    let err = alice.inbound(message(1, ack, None)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::StaleUpdateNonce);
    assert!(bob_inbox.try_recv().is_err());
    assert_eq!(
        waiter.wait(Duration::from_secs(1)).await,
        Some(SyncEvent::Error(err))
    );
}

#[tokio::test]
async fn delivering_a_proposal_twice_changes_nothing() {
    let states = history(5);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    let msg = message(
        0,
        proposal(&states[5], 0, transfer(3)),
        states[5].latest_update.clone(),
    );

    bob.inbound(msg.clone()).await.unwrap();
    let first = stored(&bob).await;
    let writes = bob.store().writes();

    let err = bob.inbound(msg).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::StaleUpdateNonce);
    assert_eq!(stored(&bob).await, first);
    assert_eq!(bob.store().writes(), writes);
    assert!(matches!(
        reply(&mut alice_inbox),
        VectorMessage::Channel { .. }
    ));
    assert!(matches!(reply(&mut alice_inbox), VectorMessage::Error { .. }));
}

#[tokio::test]
async fn concurrent_deliveries_apply_once() {
    let states = history(5);
    let (bob, _alice_inbox) = receiver(1, Some(&states[5])).await;
    let msg = message(0, proposal(&states[5], 0, transfer(3)), None);

    let (first, second) = tokio::join!(bob.inbound(msg.clone()), bob.inbound(msg));

    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    let state = stored(&bob).await.unwrap();
    assert_eq!(state.latest_nonce, 6);
    assert_eq!(state.balances, [U256::from(97u64), U256::from(103u64)]);
}

#[tokio::test]
async fn own_messages_are_ignored() {
    let states = history(5);
    let (bob, mut alice_inbox) = receiver(1, Some(&states[5])).await;
    let writes = bob.store().writes();

    bob.inbound(message(1, proposal(&states[5], 1, transfer(1)), None))
        .await
        .unwrap();

    assert_eq!(bob.store().writes(), writes);
    assert!(alice_inbox.try_recv().is_err());
}

#[tokio::test]
async fn error_messages_are_published() {
    let states = history(5);
    let (alice, _bob_inbox) = receiver(0, Some(&states[5])).await;
    let update = proposal(&states[5], 0, transfer(1));
    let error = ChannelUpdateError::new(
        UpdateFailure::StaleUpdateNonce {
            counterparty_latest_update: states[5].latest_update.clone(),
        },
        &update,
        Some(&states[5]),
    );
    let waiter = alice.events().waiter(channel(), 6);

    alice
        .inbound(VectorMessage::Error {
            from: address(KEYS[1]),
            error: error.clone(),
        })
        .await
        .unwrap();

    assert_eq!(
        waiter.wait(Duration::from_secs(1)).await,
        Some(SyncEvent::Error(error))
    );
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
}

#[tokio::test(start_paused = true)]
async fn ack_arriving_between_attempts_completes_the_update() {
    let states = history(5);
    let config = SyncConfig {
        response_timeout: Duration::from_millis(100),
        retry_delay: Duration::from_secs(1),
        ..config()
    };
    let prior = states[5].clone();
    // The ack of the first attempt shows up while alice waits to retry, the
    // retry is then rejected with the very same update.
    let (alice, frames) = scripted_bob(&states[5], config, move |n, update| {
        let acked = countersigned(update.clone(), &prior);
        match n {
            0 => vec![(
                Duration::from_millis(200),
                message(1, acked, prior.latest_update.clone()),
            )],
            _ => vec![(Duration::ZERO, stale(&update, Some(acked)))],
        }
    })
    .await;

    let state = alice.propose(channel(), transfer(2)).await.unwrap();

    assert_eq!(state.latest_nonce, 6);
    assert_eq!(state.balances, [U256::from(98u64), U256::from(102u64)]);
    assert_eq!(stored(&alice).await.as_ref(), Some(&state));
    assert_eq!(frames.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_answer_without_latest_update_fails() {
    let states = history(5);
    let (alice, frames) = scripted_bob(&states[5], config(), |_, update| {
        vec![(Duration::ZERO, stale(&update, None))]
    })
    .await;

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::StaleChannelNonceNoUpdate);
    assert_eq!(err.update.nonce, 6);
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
    assert_eq!(frames.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn resync_from_single_signed_update_fails() {
    let states = history(5);
    let theirs = proposal(&states[5], 1, transfer(1));
    let (alice, _frames) = scripted_bob(&states[5], config(), move |_, update| {
        vec![(Duration::ZERO, stale(&update, Some(theirs.clone())))]
    })
    .await;

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();

    assert!(matches!(err.failure, UpdateFailure::BadSignatures { .. }));
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
}

#[tokio::test(start_paused = true)]
async fn resync_from_forged_update_fails() {
    let states = history(6);
    let mut theirs = states[6].latest_update.clone().unwrap();
    theirs.details = transfer(50);
    let (alice, _frames) = scripted_bob(&states[5], config(), move |_, update| {
        vec![(Duration::ZERO, stale(&update, Some(theirs.clone())))]
    })
    .await;

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();

    assert!(matches!(err.failure, UpdateFailure::BadSignatures { .. }));
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
}

#[tokio::test(start_paused = true)]
async fn resync_from_update_that_does_not_apply_fails() {
    let states = history(5);
    let theirs = countersigned(proposal(&states[5], 1, transfer(1000)), &states[5]);
    let (alice, _frames) = scripted_bob(&states[5], config(), move |_, update| {
        vec![(Duration::ZERO, stale(&update, Some(theirs.clone())))]
    })
    .await;

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::ApplyUpdateFailed);
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
}

#[tokio::test(start_paused = true)]
async fn failed_save_during_resync_is_reported() {
    let states = history(6);
    let theirs = states[6].latest_update.clone();
    let (alice, _frames) = scripted_bob(&states[5], config(), move |_, update| {
        vec![(Duration::ZERO, stale(&update, theirs.clone()))]
    })
    .await;
    alice.store().fail_next_saves(1);

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::SaveChannelFailed);
    assert_eq!(stored(&alice).await, Some(states[5].clone()));
}

#[tokio::test(start_paused = true)]
async fn second_stale_answer_after_resync_is_returned() {
    let states = history(6);
    let theirs = states[6].latest_update.clone();
    let (alice, frames) = scripted_bob(&states[5], config(), move |_, update| {
        vec![(Duration::ZERO, stale(&update, theirs.clone()))]
    })
    .await;

    let err = alice.propose(channel(), transfer(2)).await.unwrap_err();

    assert_eq!(err.reason(), UpdateErrorReason::StaleUpdateNonce);
    assert_eq!(err.update.nonce, 7);
    assert_eq!(err.update.details, transfer(2));
    assert_eq!(stored(&alice).await, Some(states[6].clone()));
    assert_eq!(frames.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn own_signature_is_added_once() {
    let states = history(5);
    let (alice, _bob_inbox) = receiver(0, Some(&states[5])).await;
    let mut update = ChannelUpdate::new(
        channel(),
        6,
        address(KEYS[0]),
        address(KEYS[1]),
        transfer(1),
    );

    alice.sign_update(&mut update, &states[5]).unwrap();
    assert!(update.commitment.is_proposed());
    update
        .commitment
        .verify(update.commitment_hash(), &states[5].participants)
        .unwrap();

    let signed = update.clone();
    let err = alice.sign_update(&mut update, &states[5]).unwrap_err();
    assert!(matches!(err.failure, UpdateFailure::BadSignatures { .. }));
    assert_eq!(update, signed);
}

#[tokio::test]
async fn stranger_cannot_sign_for_the_channel() {
    let states = history(5);
    let network = LocalNetwork::new();
    let (stranger, _inbox) = node(&network, STRANGER);
    let mut update = ChannelUpdate::new(
        channel(),
        6,
        address(STRANGER),
        address(KEYS[1]),
        transfer(1),
    );

    let err = stranger.sign_update(&mut update, &states[5]).unwrap_err();

    assert!(matches!(err.failure, UpdateFailure::BadSignatures { .. }));
    assert_eq!(update.commitment.num_signatures(), 0);
}
