//! Peer Online Tracker: which redeemers currently hold a rendezvous session
//!
//! Connection events only tell the tracker that something changed; the
//! online set itself is read back from the connection layer's session
//! table. A missed or duplicated event therefore can never leave a peer
//! stuck online. Nothing here is persisted.

use crate::registry::ServerRegistry;
use crate::transport::{ConnectionEvent, ConnectionLayer, TransportKind};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub struct PeerOnlineTracker {
    /// The Online Remote Set as of the last refresh
    online: RwLock<HashSet<String>>,
    registry: Arc<ServerRegistry>,
    layer: Arc<dyn ConnectionLayer>,
}

impl PeerOnlineTracker {
    pub fn new(registry: Arc<ServerRegistry>, layer: Arc<dyn ConnectionLayer>) -> Self {
        Self {
            online: RwLock::new(HashSet::new()),
            registry,
            layer,
        }
    }

    /// Apply one connection event. Only rendezvous sessions count.
    pub fn observe(&self, event: &ConnectionEvent) {
        if event.transport() != TransportKind::Dht {
            return;
        }
        debug!("online tracker: {}", event);
        self.refresh();
    }

    /// Re-read the open sessions and recompute every hosting entry
    pub fn refresh(&self) {
        let online: HashSet<String> = self.layer.connected_peers().into_iter().collect();
        *self.online.write() = online.clone();

        if self.registry.is_started() {
            self.registry.refresh_online(&online);
        }
    }

    pub fn is_online(&self, peer_id: &str) -> bool {
        self.online.read().contains(peer_id)
    }

    /// The Online Remote Set
    pub fn online(&self) -> HashSet<String> {
        self.online.read().clone()
    }

    /// Consume connection events until the connection layer or the
    /// tracker goes away. Holds the tracker weakly, since the tracker owns
    /// the layer that feeds this loop.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ConnectionEvent>) {
        let tracker = Arc::downgrade(&self);
        drop(self);

        loop {
            let received = events.recv().await;
            let Some(tracker) = tracker.upgrade() else {
                break;
            };
            match received {
                Ok(event) => tracker.observe(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("online tracker missed {} connection events, resyncing", missed);
                    tracker.refresh();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
