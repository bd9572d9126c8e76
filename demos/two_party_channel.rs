//! Two nodes in one process opening a payment channel, transferring back and
//! forth and closing it again.
//!
//! Run with `RUST_LOG=debug` to follow the protocol messages.

use std::{sync::Arc, time::Duration};

use channel_sync::{
    channel::UpdateDetails,
    sig::Signer,
    store::MemoryStore,
    wire::{LocalNetwork, ProtoBufEncodingLayer},
    SyncClient, SyncConfig, U256,
};
use tracing_subscriber::EnvFilter;

const PARTICIPANTS: [&str; 2] = ["Alice", "Bob"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = SyncConfig {
        retry_delay: Duration::from_millis(200),
        response_timeout: Duration::from_secs(1),
        ..SyncConfig::default()
    };

    // Each participant gets its own key, store and inbox on the network.
    let network = LocalNetwork::new();
    let mut rng = rand::thread_rng();
    let mut nodes = Vec::new();
    for name in PARTICIPANTS {
        let signer = Signer::new(&mut rng);
        println!("{name}: {}", signer.address());
        let (bus, inbox) = network.register(signer.address());
        let node = Arc::new(SyncClient::new(
            MemoryStore::new(),
            ProtoBufEncodingLayer::new(bus),
            signer,
            config.clone(),
        ));
        tokio::spawn(node.clone().run(inbox));
        nodes.push(node);
    }
    let (alice, bob) = (&nodes[0], &nodes[1]);

    let state = alice
        .setup(bob.address(), 3600, [U256::from(100u64), U256::from(20u64)])
        .await?;
    let channel = state.channel_address;
    println!("Channel {channel} is open: {:?}", state.balances);

    let state = alice
        .propose(channel, UpdateDetails::Transfer { amount: U256::from(30u64) })
        .await?;
    println!("Alice paid 30: {:?}", state.balances);

    // Alice's next two answers get lost. Bob retries and recovers the
    // countersigned update from her rejection of the duplicate.
    alice.bus().bus.drop_next(2);
    let state = bob
        .propose(channel, UpdateDetails::Transfer { amount: U256::from(5u64) })
        .await?;
    println!("Bob paid 5: {:?}", state.balances);

    let state = alice
        .propose(channel, UpdateDetails::Transfer { amount: U256::from(10u64) })
        .await?;
    println!("Alice paid 10: {:?}", state.balances);

    // Alice rejects the overdraft, both copies stay untouched.
    match bob
        .propose(channel, UpdateDetails::Transfer { amount: U256::from(1000u64) })
        .await
    {
        Ok(_) => println!("Bob overdrew the channel?!"),
        Err(e) => println!("Bob's overdraft was rejected: {e}"),
    }

    let state = bob.propose(channel, UpdateDetails::Close).await?;
    println!(
        "Channel closed at nonce {} with balances {:?}",
        state.latest_nonce, state.balances
    );
    Ok(())
}
