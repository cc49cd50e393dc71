//! Claim Protocol Engine: `start`, `create`, `use`, `accept`, `remove`
//!
//! ```text
//! issuer A                                   redeemer B
//! create() -> "dht:SEED:A"
//!                                            accept("dht:SEED:A")
//!                                              record pending
//!                                              dial "dht:SEED:A~shs:A" (retry)
//! use({SEED, B})  <--------------------------  rpc.use
//!   SEED: unclaimed -> B
//!   follow B
//!   {SEED, A}  ------------------------------>
//!                                              delete pending
//!                                              follow A
//!                                              remember address
//! ```

use crate::claims::ClaimTracker;
use crate::config::InviteConfig;
use crate::invite::Invite;
use crate::online::PeerOnlineTracker;
use crate::registry::{ClaimOutcome, HostingEntry, ServerRegistry};
use crate::social::{FollowRecord, PeerDirectory, SocialGraph};
use crate::store::backend::StorageBackend;
use crate::transport::{dial, ConnectionLayer, RpcSession, TransportError, UseRequest, UseResponse};
use crate::InviteError;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// External systems the invite service drives
#[derive(Clone)]
pub struct Collaborators {
    pub connections: Arc<dyn ConnectionLayer>,
    pub social: Arc<dyn SocialGraph>,
    pub directory: Arc<dyn PeerDirectory>,
}

struct Inner {
    id: String,
    config: InviteConfig,
    backend: Arc<dyn StorageBackend>,
    collaborators: Collaborators,
    registry: Arc<ServerRegistry>,
    claims: ClaimTracker,
    online: Arc<PeerOnlineTracker>,
    /// Redemption sessions kept open for reuse, by dial address
    sessions: RwLock<HashMap<String, Arc<dyn RpcSession>>>,
    started: Mutex<bool>,
}

/// One node's invite service. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DhtInvite {
    inner: Arc<Inner>,
}

impl DhtInvite {
    pub fn new(
        id: impl Into<String>,
        config: InviteConfig,
        backend: Arc<dyn StorageBackend>,
        collaborators: Collaborators,
    ) -> Self {
        let id = id.into();
        let registry = Arc::new(ServerRegistry::new(id.clone(), config.server_namespace.clone()));
        let claims = ClaimTracker::new(config.client_namespace.clone());
        let online = Arc::new(PeerOnlineTracker::new(
            registry.clone(),
            collaborators.connections.clone(),
        ));

        Self {
            inner: Arc::new(Inner {
                id,
                config,
                backend,
                collaborators,
                registry,
                claims,
                online,
                sessions: RwLock::new(HashMap::new()),
                started: Mutex::new(false),
            }),
        }
    }

    /// Public identity of this node
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &InviteConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.inner.registry
    }

    pub fn claims(&self) -> &ClaimTracker {
        &self.inner.claims
    }

    pub fn online(&self) -> &PeerOnlineTracker {
        &self.inner.online
    }

    pub fn is_started(&self) -> bool {
        *self.inner.started.lock()
    }

    /// Attach both stores, start tracking connections and retry every
    /// invite left pending by a previous run. Safe to call repeatedly.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), InviteError> {
        let pending = {
            let mut started = self.inner.started.lock();
            if *started {
                return Ok(());
            }
            info!("dhtinvite.start as {}", self.inner.id);

            // Subscribe before restoring so no session is missed
            let events = self.inner.collaborators.connections.events();
            self.inner.registry.attach(self.inner.backend.clone())?;
            let pending = self.inner.claims.attach(self.inner.backend.clone())?;
            *started = true;

            // Sessions opened before start
            self.inner.online.refresh();

            tokio::spawn(self.inner.online.clone().run(events));
            pending
        };

        for invite in pending {
            let node = self.clone();
            tokio::spawn(async move {
                if let Err(e) = node.accept(&invite).await {
                    warn!("dhtinvite: retrying {} after restart failed: {}", invite, e);
                }
            });
        }
        Ok(())
    }

    /// Host a new invite and return its shareable string
    pub fn create(&self) -> Result<String, InviteError> {
        let invite = self.inner.registry.create()?;
        info!("dhtinvite.create hosting channel {}", invite.channel());
        Ok(invite.to_string())
    }

    /// Issuer side of the exchange: bind `request.seed` to the redeemer and
    /// follow them back. Repeating a successful call changes nothing.
    ///
    /// A failed follow is reported even though the claim is already durable.
    pub async fn use_invite(&self, request: UseRequest) -> Result<UseResponse, InviteError> {
        debug!("dhtinvite.use called with {:?}", request);
        let outcome = self.inner.registry.claim(&request.seed, &request.feed)?;
        let response = UseResponse {
            seed: request.seed,
            feed: self.inner.id.clone(),
        };

        if outcome == ClaimOutcome::AlreadyHeld {
            debug!("dhtinvite.use: {} already holds this invite", request.feed);
            return Ok(response);
        }

        debug!("dhtinvite.use claimed invite and will follow {}", request.feed);
        self.inner
            .collaborators
            .social
            .publish(FollowRecord::follow(request.feed.as_str()))
            .await
            .map_err(|e| InviteError::PublishFailure(format!("Could not follow {}: {}", request.feed, e)))?;

        debug!("dhtinvite.use will return {:?}", response);
        Ok(response)
    }

    /// Redeemer side of the exchange. Resolves once the issuer confirmed the
    /// claim; dialing retries until the issuer is reachable.
    pub async fn accept(&self, invite: &str) -> Result<bool, InviteError> {
        if !self.inner.claims.is_started() {
            return Err(InviteError::NotStarted("accept"));
        }
        let parsed = Invite::parse(invite)?;
        self.inner.claims.record(invite)?;

        let address = parsed.dial_address();
        debug!("dhtinvite.accept calculated remote addr: {}", address);
        let session = self.session_for(&address).await?;

        let request = UseRequest {
            seed: parsed.seed().to_string(),
            feed: self.inner.id.clone(),
        };
        debug!("dhtinvite.accept will call remote use: {:?}", request);
        let response = match session.use_invite(request).await {
            Ok(response) => response,
            Err(e @ TransportError::Rejected(_)) => {
                return Err(InviteError::RemoteRejected(format!(
                    "Could not tell friend to use DHT invite: {}",
                    e
                )));
            }
            Err(e) => {
                // The session is broken; the next accept dials again
                self.inner.sessions.write().remove(&address);
                return Err(InviteError::TransportFailure(format!(
                    "Could not tell friend to use DHT invite: {}",
                    e
                )));
            }
        };

        self.inner.claims.complete(invite)?;
        if response.feed != parsed.remote_id() {
            warn!(
                "dhtinvite.accept: issuer answered as {} instead of {}",
                response.feed,
                parsed.remote_id()
            );
        }

        tokio::time::sleep(self.inner.config.follow_delay()).await;
        debug!("dhtinvite.accept will follow friend {}", response.feed);
        let followed = self
            .inner
            .collaborators
            .social
            .publish(FollowRecord::follow(response.feed.as_str()))
            .await;

        debug!("dhtinvite.accept will remember {}", address);
        self.inner
            .collaborators
            .directory
            .remember(&address, &[self.inner.config.transport_tag.clone()]);

        followed.map_err(|e| {
            InviteError::PublishFailure(format!("Could not follow {}: {}", response.feed, e))
        })?;
        Ok(true)
    }

    /// Forget an invite: stop hosting it when this node issued it,
    /// otherwise drop the pending redemption. Absent invites are a no-op.
    pub fn remove(&self, invite: &str) -> Result<bool, InviteError> {
        let parsed = Invite::parse(invite)?;
        if parsed.remote_id() == self.inner.id {
            self.inner.registry.remove(parsed.seed())
        } else {
            self.inner.claims.remove(invite)
        }
    }

    /// Reuse the session to `address` or dial a new one
    async fn session_for(&self, address: &str) -> Result<Arc<dyn RpcSession>, InviteError> {
        if let Some(session) = self.inner.sessions.read().get(address).cloned() {
            debug!("dhtinvite.accept reusing connection to {}", address);
            return Ok(session);
        }

        debug!("dhtinvite.accept will get RPC connection");
        let session = dial(
            self.inner.collaborators.connections.clone(),
            address,
            &self.inner.config.retry,
        )
        .await
        .map_err(|e| InviteError::TransportFailure(format!("Could not connect to DHT server: {}", e)))?;
        debug!("dhtinvite.accept got RPC connection to {}", session.remote_id());

        self.inner
            .sessions
            .write()
            .insert(address.to_string(), session.clone());
        Ok(session)
    }

    /// Rendezvous channels to listen on, one per hosted code
    pub fn channels(&self) -> watch::Receiver<Vec<String>> {
        self.inner.registry.subscribe_channels()
    }

    /// `{seed, claimer, online}` snapshots of hosted codes
    pub fn hosting(&self) -> watch::Receiver<Vec<HostingEntry>> {
        self.inner.registry.subscribe_hosting()
    }

    /// Invites still waiting for redemption
    pub fn pending(&self) -> watch::Receiver<Vec<String>> {
        self.inner.claims.subscribe()
    }

    pub fn channels_stream(&self) -> WatchStream<Vec<String>> {
        WatchStream::new(self.channels())
    }

    pub fn hosting_stream(&self) -> WatchStream<Vec<HostingEntry>> {
        WatchStream::new(self.hosting())
    }

    pub fn pending_stream(&self) -> WatchStream<Vec<String>> {
        WatchStream::new(self.pending())
    }
}
