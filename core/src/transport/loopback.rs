//! In-process rendezvous transport
//!
//! Nodes attach to a [`LoopbackNetwork`] under their feed id. Dialing a
//! `dht:<seed>:<id>~shs:<id>` address reaches the node attached as `<id>`
//! and calls into it as an anonymous remote caller, with requests and
//! responses passing through the bincode wire encoding.

use super::abstraction::{
    ConnectionEvent, ConnectionLayer, RpcSession, TransportError, TransportKind, UseRequest,
    UseResponse,
};
use crate::invite::{Invite, HANDSHAKE_SCHEME};
use crate::rpc::{Caller, Request, Response};
use crate::service::DhtInvite;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_BUFFER: usize = 64;

#[derive(Default)]
struct NetworkInner {
    nodes: RwLock<HashMap<String, DhtInvite>>,
    events: RwLock<HashMap<String, broadcast::Sender<ConnectionEvent>>>,
    /// Open sessions per node, per remote identity
    links: RwLock<HashMap<String, HashMap<String, usize>>>,
}

impl NetworkInner {
    /// Record a session between `a` and `b`, then tell both sides
    fn open_link(&self, a: &str, b: &str) {
        {
            let mut links = self.links.write();
            for (from, to) in [(a, b), (b, a)] {
                *links
                    .entry(from.to_string())
                    .or_default()
                    .entry(to.to_string())
                    .or_insert(0) += 1;
            }
        }
        for (from, to) in [(a, b), (b, a)] {
            self.emit(
                from,
                ConnectionEvent::Connected {
                    peer_id: to.to_string(),
                    transport: TransportKind::Dht,
                },
            );
        }
    }

    /// Forget one session between `a` and `b`, then tell both sides
    fn close_link(&self, a: &str, b: &str) {
        {
            let mut links = self.links.write();
            for (from, to) in [(a, b), (b, a)] {
                if let Some(peers) = links.get_mut(from) {
                    if let Some(count) = peers.get_mut(to) {
                        *count -= 1;
                        if *count == 0 {
                            peers.remove(to);
                        }
                    }
                }
            }
        }
        for (from, to) in [(a, b), (b, a)] {
            self.emit(
                from,
                ConnectionEvent::Disconnected {
                    peer_id: to.to_string(),
                    transport: TransportKind::Dht,
                },
            );
        }
    }

    fn peers_of(&self, id: &str) -> Vec<String> {
        self.links
            .read()
            .get(id)
            .map(|peers| peers.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn emit(&self, to: &str, event: ConnectionEvent) {
        if let Some(tx) = self.events.read().get(to) {
            // No subscribers yet is fine
            let _ = tx.send(event);
        }
    }

    fn sender_for(&self, id: &str) -> broadcast::Sender<ConnectionEvent> {
        self.events
            .write()
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0)
            .clone()
    }
}

/// Shared in-memory rendezvous fabric
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection layer used by the node identified as `local_id`
    pub fn connector(&self, local_id: &str) -> Arc<LoopbackConnector> {
        Arc::new(LoopbackConnector {
            local_id: local_id.to_string(),
            events: self.inner.sender_for(local_id),
            network: Arc::downgrade(&self.inner),
        })
    }

    /// Make `node` reachable under its feed id
    pub fn attach(&self, node: &DhtInvite) {
        self.inner
            .nodes
            .write()
            .insert(node.id().to_string(), node.clone());
    }

    /// Make the node identified as `id` unreachable
    pub fn detach(&self, id: &str) {
        self.inner.nodes.write().remove(id);
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.inner.nodes.read().contains_key(id)
    }
}

/// Resolve the issuer identity a dial address points at
fn resolve(address: &str) -> Result<String, TransportError> {
    let invalid = || TransportError::InvalidAddress(address.to_string());

    let (invite, transform) = address.split_once('~').ok_or_else(invalid)?;
    let (scheme, key) = transform.split_once(':').ok_or_else(invalid)?;
    if scheme != HANDSHAKE_SCHEME {
        return Err(invalid());
    }
    let invite = Invite::parse(invite).map_err(|_| invalid())?;
    if invite.remote_id() != key {
        return Err(invalid());
    }
    Ok(key.to_string())
}

pub struct LoopbackConnector {
    local_id: String,
    events: broadcast::Sender<ConnectionEvent>,
    network: Weak<NetworkInner>,
}

#[async_trait]
impl ConnectionLayer for LoopbackConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn RpcSession>, TransportError> {
        let remote_id = resolve(address)?;
        let network = self.network.upgrade().ok_or(TransportError::Closed)?;
        if !network.nodes.read().contains_key(&remote_id) {
            return Err(TransportError::Unreachable(remote_id));
        }

        debug!("loopback: {} connected to {}", self.local_id, remote_id);
        network.open_link(&self.local_id, &remote_id);

        Ok(Arc::new(LoopbackSession {
            local_id: self.local_id.clone(),
            remote_id,
            network: self.network.clone(),
        }))
    }

    fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn connected_peers(&self) -> Vec<String> {
        self.network
            .upgrade()
            .map(|network| network.peers_of(&self.local_id))
            .unwrap_or_default()
    }
}

pub struct LoopbackSession {
    local_id: String,
    remote_id: String,
    network: Weak<NetworkInner>,
}

#[async_trait]
impl RpcSession for LoopbackSession {
    fn remote_id(&self) -> &str {
        &self.remote_id
    }

    async fn use_invite(&self, request: UseRequest) -> Result<UseResponse, TransportError> {
        let network = self.network.upgrade().ok_or(TransportError::Closed)?;
        let node = network.nodes.read().get(&self.remote_id).cloned();
        let node = node.ok_or(TransportError::Closed)?;

        let request = UseRequest::from_bytes(&request.to_bytes()?)?;
        match node.handle(Caller::Anonymous, Request::Use(request)).await {
            Ok(Response::Used(response)) => UseResponse::from_bytes(&response.to_bytes()?),
            Ok(other) => Err(TransportError::Rejected(format!(
                "unexpected response {:?}",
                other
            ))),
            Err(e) => Err(TransportError::Rejected(e.to_string())),
        }
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        if let Some(network) = self.network.upgrade() {
            network.close_link(&self.local_id, &self.remote_id);
        }
    }
}
