// DHT Invites: single-use invite codes redeemed over a rendezvous transport
//
// One peer hosts a code, a stranger redeems it, and both end up following
// each other. Everything else (transport, social graph, peer directory) is
// a collaborator behind a trait.

pub mod claims;
pub mod config;
pub mod identity;
pub mod invite;
pub mod online;
pub mod registry;
pub mod rpc;
pub mod service;
pub mod social;
pub mod store;
pub mod transport;

use thiserror::Error;

pub use claims::ClaimTracker;
pub use config::{InviteConfig, RetryPolicy};
pub use identity::NodeIdentity;
pub use invite::{Invite, InviteCode, ParseError};
pub use online::PeerOnlineTracker;
pub use registry::{Claimer, HostingEntry, ServerRegistry};
pub use rpc::{Caller, Method, MethodKind, Request, Response, Subscription};
pub use service::{Collaborators, DhtInvite};
pub use social::{FollowRecord, MemoryPeerDirectory, MemorySocialGraph, PeerDirectory, SocialGraph};
pub use store::backend::{MemoryStorage, SledStorage, StorageBackend};
pub use transport::{
    ConnectionEvent, ConnectionLayer, LoopbackNetwork, RpcSession, TransportError, TransportKind,
    UseRequest, UseResponse,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InviteError {
    #[error("Cannot call dhtInvite.{0}() before dhtInvite.start()")]
    NotStarted(&'static str),
    #[error("Cannot `use` an invite that does not exist")]
    NotFound,
    #[error("Cannot `use` an already claimed invite")]
    AlreadyClaimed,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    MalformedInvite(#[from] ParseError),
    #[error("{0}")]
    TransportFailure(String),
    #[error("{0}")]
    RemoteRejected(String),
    #[error("{0}")]
    StoreFailure(String),
    #[error("{0}")]
    PublishFailure(String),
    #[error("Method {method} is not allowed for {caller} callers")]
    Forbidden { method: &'static str, caller: &'static str },
}

impl InviteError {
    /// Wrap a storage error with a human-readable prefix
    pub(crate) fn store(context: &str, err: impl std::fmt::Display) -> Self {
        InviteError::StoreFailure(format!("{}: {}", context, err))
    }
}
