//! Invite service configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dial retry policy for reaching an issuer over the rendezvous transport.
///
/// Delays start at `initial_delay_ms` and double per attempt until they hit
/// `max_delay_ms`. There is no overall deadline: rendezvous convergence can
/// take arbitrarily long, so the attempt ceiling defaults to `u32::MAX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Wait after the first attempt, in milliseconds
    pub initial_delay_ms: u64,
    /// Cap on the per-attempt wait, in milliseconds
    pub max_delay_ms: u64,
    /// Attempts before giving up
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 60_000,
            max_attempts: u32::MAX,
        }
    }
}

impl RetryPolicy {
    /// Wait before launching attempt `attempt + 1` (attempts are 0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(63));
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InviteConfig {
    /// Store namespace for codes this node hosts
    pub server_namespace: String,
    /// Store namespace for invites this node still has to redeem
    pub client_namespace: String,
    /// Dialing behaviour towards an issuer
    pub retry: RetryPolicy,
    /// Pause between a confirmed remote claim and the local follow
    pub follow_delay_ms: u64,
    /// Tag handed to the peer directory for redeemed addresses
    pub transport_tag: String,
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            server_namespace: "dhtServerCodes".to_string(),
            client_namespace: "dhtClientCodes".to_string(),
            retry: RetryPolicy::default(),
            follow_delay_ms: 100,
            transport_tag: "dht".to_string(),
        }
    }
}

impl InviteConfig {
    pub fn follow_delay(&self) -> Duration {
        Duration::from_millis(self.follow_delay_ms)
    }
}
