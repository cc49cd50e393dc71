//! Transport abstraction for invite redemption
//!
//! Defines the connection-layer events and the narrow RPC surface the
//! invite protocol needs from whatever transport carries it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Transport a session was established over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// DHT rendezvous transport
    Dht,
    /// Plain network address
    Net,
    /// Local transport for testing
    Local,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Dht => write!(f, "dht"),
            TransportKind::Net => write!(f, "net"),
            TransportKind::Local => write!(f, "local"),
        }
    }
}

/// Session lifecycle events observed by the connection layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// A new inbound or outbound session was established
    Connected {
        peer_id: String,
        transport: TransportKind,
    },
    /// A session was closed
    Disconnected {
        peer_id: String,
        transport: TransportKind,
    },
}

impl ConnectionEvent {
    pub fn peer_id(&self) -> &str {
        match self {
            ConnectionEvent::Connected { peer_id, .. }
            | ConnectionEvent::Disconnected { peer_id, .. } => peer_id,
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            ConnectionEvent::Connected { transport, .. }
            | ConnectionEvent::Disconnected { transport, .. } => *transport,
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Connected { peer_id, transport } => {
                write!(f, "Connected {{ peer_id: {}, transport: {} }}", peer_id, transport)
            }
            ConnectionEvent::Disconnected { peer_id, transport } => {
                write!(f, "Disconnected {{ peer_id: {}, transport: {} }}", peer_id, transport)
            }
        }
    }
}

/// Request sent by a redeemer to the issuer's `use`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseRequest {
    /// Invite code being redeemed
    pub seed: String,
    /// Identity of the redeemer
    pub feed: String,
}

/// Issuer's answer to a successful `use`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseResponse {
    /// Invite code that was redeemed
    pub seed: String,
    /// Identity of the issuer
    pub feed: String,
}

impl UseRequest {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        bincode::serialize(self).map_err(|e| TransportError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        bincode::deserialize(bytes).map_err(|e| TransportError::Serialization(e.to_string()))
    }
}

impl UseResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        bincode::serialize(self).map_err(|e| TransportError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        bincode::deserialize(bytes).map_err(|e| TransportError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No route to {0}")]
    Unreachable(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Remote error: {0}")]
    Rejected(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Connection closed")]
    Closed,
}

/// An established RPC session with a remote peer
#[async_trait]
pub trait RpcSession: Send + Sync {
    /// Identity authenticated by the session handshake
    fn remote_id(&self) -> &str;

    /// Call the remote `use`
    async fn use_invite(&self, request: UseRequest) -> Result<UseResponse, TransportError>;
}

/// The connection layer: dialing plus a stream of session events
#[async_trait]
pub trait ConnectionLayer: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn RpcSession>, TransportError>;

    fn events(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Remote identities holding at least one open rendezvous session
    fn connected_peers(&self) -> Vec<String>;
}
