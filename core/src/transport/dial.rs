//! Resilient dialing over the rendezvous transport
//!
//! Attempts are launched on an exponential schedule. An attempt that has
//! not finished when the next one is due keeps running, so several dials to
//! the same issuer may be in flight at once. Whichever resolves the dial
//! first wins; every later result is dropped.

use super::abstraction::{ConnectionLayer, RpcSession, TransportError};
use crate::config::RetryPolicy;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::debug;

/// A completion slot that can be filled at most once
pub struct SingleFire<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for SingleFire<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> SingleFire<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let guard = Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (guard, rx)
    }

    /// Resolve with `value`. Returns false, dropping `value`, if already resolved.
    pub fn fire(&self, value: T) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }
}

type DialResult = Result<Arc<dyn RpcSession>, TransportError>;

/// Drop the bookkeeping of attempts that already finished
fn reap_finished(attempts: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while attempts.try_join_next().is_some() {
        reaped += 1;
    }
    reaped
}

/// Dial `address` until a session is obtained or the policy gives up
pub async fn dial(
    layer: Arc<dyn ConnectionLayer>,
    address: &str,
    policy: &RetryPolicy,
) -> DialResult {
    let (guard, mut resolved) = SingleFire::<DialResult>::new();
    let mut attempts = JoinSet::new();
    let mut launched: u32 = 0;

    loop {
        launched += 1;
        let attempt = launched;
        let guard_for_attempt = guard.clone();
        let layer = Arc::clone(&layer);
        let target = address.to_string();
        attempts.spawn(async move {
            match layer.connect(&target).await {
                Ok(session) => {
                    if !guard_for_attempt.fire(Ok(session)) {
                        debug!(attempt, "discarding superseded connection to {}", target);
                    }
                }
                Err(e) => debug!(attempt, "dial to {} failed: {}", target, e),
            }
        });

        let reaped = reap_finished(&mut attempts);
        if reaped > 0 {
            debug!("reaped {} finished attempt(s), {} in flight", reaped, attempts.len());
        }

        if launched >= policy.max_attempts {
            break;
        }

        tokio::select! {
            result = &mut resolved => {
                return result.unwrap_or(Err(TransportError::Closed));
            }
            _ = tokio::time::sleep(policy.delay_for(attempt - 1)) => {}
        }
    }

    // Retries abandoned: let in-flight attempts settle before giving up
    while attempts.join_next().await.is_some() {}
    guard.fire(Err(TransportError::ConnectionFailed(format!(
        "gave up on {} after {} attempts",
        address, launched
    ))));
    resolved.await.unwrap_or(Err(TransportError::Closed))
}
