//! Tuning knobs of the synchronization protocol.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Configuration of a [SyncClient][crate::SyncClient].
///
/// Deserializable so it can be embedded in the configuration of the
/// application hosting the node. Missing fields take their default, durations
/// are given in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Chain the node's channels live on, used for channels set up by the
    /// counterparty.
    pub chain_id: u64,
    /// Round trips attempted per outbound update before giving up.
    pub retry_attempts: u32,
    /// Pause between two round trip attempts.
    #[serde(rename = "retry_delay_ms", deserialize_with = "millis")]
    pub retry_delay: Duration,
    /// How long an attempt waits for the counterparty's answer.
    #[serde(rename = "response_timeout_ms", deserialize_with = "millis")]
    pub response_timeout: Duration,
    /// Timeout of a single message send.
    #[serde(rename = "send_timeout_ms", deserialize_with = "millis")]
    pub send_timeout: Duration,
    /// Buffered events per event bus stream.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            retry_attempts: 5,
            retry_delay: Duration::from_millis(3000),
            response_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            event_capacity: 64,
        }
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
