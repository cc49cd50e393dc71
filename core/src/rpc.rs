//! Remote-callable surface of the invite service
//!
//! The local master may call anything. Anonymous remote peers, who by
//! definition have no prior relationship with this node, may only call
//! `use`.

use crate::registry::HostingEntry;
use crate::service::DhtInvite;
use crate::transport::{UseRequest, UseResponse};
use crate::InviteError;
use std::fmt;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// The node's own operator
    Master,
    /// An unauthenticated remote peer
    Anonymous,
}

impl Caller {
    pub fn name(self) -> &'static str {
        match self {
            Caller::Master => "master",
            Caller::Anonymous => "anonymous",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Single request, single response
    Async,
    /// Subscription to a stream of snapshots
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Start,
    Create,
    Use,
    Accept,
    Remove,
    Channels,
    Hosting,
    Pending,
}

/// Every method the service exposes
pub const MANIFEST: [Method; 8] = [
    Method::Start,
    Method::Create,
    Method::Use,
    Method::Accept,
    Method::Remove,
    Method::Channels,
    Method::Hosting,
    Method::Pending,
];

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Start => "start",
            Method::Create => "create",
            Method::Use => "use",
            Method::Accept => "accept",
            Method::Remove => "remove",
            Method::Channels => "channels",
            Method::Hosting => "hosting",
            Method::Pending => "pending",
        }
    }

    pub fn kind(self) -> MethodKind {
        match self {
            Method::Channels | Method::Hosting | Method::Pending => MethodKind::Source,
            _ => MethodKind::Async,
        }
    }

    pub fn allows(self, caller: Caller) -> bool {
        match caller {
            Caller::Master => true,
            Caller::Anonymous => self == Method::Use,
        }
    }

    fn check(self, caller: Caller) -> Result<(), InviteError> {
        if self.allows(caller) {
            Ok(())
        } else {
            warn!("refused {} call to {}", caller.name(), self.name());
            Err(InviteError::Forbidden {
                method: self.name(),
                caller: caller.name(),
            })
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Start,
    Create,
    Use(UseRequest),
    Accept(String),
    Remove(String),
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::Start => Method::Start,
            Request::Create => Method::Create,
            Request::Use(_) => Method::Use,
            Request::Accept(_) => Method::Accept,
            Request::Remove(_) => Method::Remove,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Started,
    Invite(String),
    Used(UseResponse),
    Accepted(bool),
    Removed(bool),
}

pub enum Subscription {
    Channels(watch::Receiver<Vec<String>>),
    Hosting(watch::Receiver<Vec<HostingEntry>>),
    Pending(watch::Receiver<Vec<String>>),
}

impl DhtInvite {
    /// Dispatch a request on behalf of `caller`
    pub async fn handle(&self, caller: Caller, request: Request) -> Result<Response, InviteError> {
        request.method().check(caller)?;
        match request {
            Request::Start => self.start().map(|_| Response::Started),
            Request::Create => self.create().map(Response::Invite),
            Request::Use(req) => self.use_invite(req).await.map(Response::Used),
            Request::Accept(invite) => self.accept(&invite).await.map(Response::Accepted),
            Request::Remove(invite) => self.remove(&invite).map(Response::Removed),
        }
    }

    /// Open one of the snapshot streams on behalf of `caller`
    pub fn subscribe(&self, caller: Caller, method: Method) -> Result<Subscription, InviteError> {
        method.check(caller)?;
        match method {
            Method::Channels => Ok(Subscription::Channels(self.channels())),
            Method::Hosting => Ok(Subscription::Hosting(self.hosting())),
            Method::Pending => Ok(Subscription::Pending(self.pending())),
            other => Err(InviteError::InvalidRequest(format!(
                "{} is not a stream",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InviteConfig;
    use crate::service::Collaborators;
    use crate::social::{MemoryPeerDirectory, MemorySocialGraph};
    use crate::store::backend::MemoryStorage;
    use crate::transport::LoopbackNetwork;
    use std::sync::Arc;

    fn node() -> DhtInvite {
        let network = LoopbackNetwork::new();
        DhtInvite::new(
            "@alice",
            InviteConfig::default(),
            Arc::new(MemoryStorage::new()),
            Collaborators {
                connections: network.connector("@alice"),
                social: Arc::new(MemorySocialGraph::new()),
                directory: Arc::new(MemoryPeerDirectory::new()),
            },
        )
    }

    #[test]
    fn test_manifest_permissions() {
        for method in MANIFEST {
            assert_eq!(method.allows(Caller::Anonymous), method == Method::Use);
            assert!(method.allows(Caller::Master));
        }
        assert_eq!(Method::Hosting.kind(), MethodKind::Source);
        assert_eq!(Method::Accept.kind(), MethodKind::Async);
    }

    #[tokio::test]
    async fn test_anonymous_cannot_create() {
        let node = node();
        node.handle(Caller::Master, Request::Start).await.unwrap();

        let err = node
            .handle(Caller::Anonymous, Request::Create)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InviteError::Forbidden {
                method: "create",
                caller: "anonymous"
            }
        );
        assert!(node.registry().entries().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_use_claims() {
        let node = node();
        node.handle(Caller::Master, Request::Start).await.unwrap();
        let Response::Invite(invite) = node.handle(Caller::Master, Request::Create).await.unwrap()
        else {
            panic!("expected an invite");
        };
        let seed = crate::invite::Invite::parse(&invite).unwrap().seed().to_string();

        let response = node
            .handle(
                Caller::Anonymous,
                Request::Use(UseRequest {
                    seed: seed.clone(),
                    feed: "@bob".to_string(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            response,
            Response::Used(UseResponse {
                seed,
                feed: "@alice".to_string()
            })
        );
    }

    #[test]
    fn test_streams_are_master_only() {
        let node = node();
        assert!(matches!(
            node.subscribe(Caller::Anonymous, Method::Hosting),
            Err(InviteError::Forbidden { .. })
        ));
        assert!(matches!(
            node.subscribe(Caller::Master, Method::Pending),
            Ok(Subscription::Pending(_))
        ));
        assert!(matches!(
            node.subscribe(Caller::Master, Method::Create),
            Err(InviteError::InvalidRequest(_))
        ));
    }
}
