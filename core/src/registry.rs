//! Server Code Registry: invite codes hosted by this node
//!
//! The store is the source of truth and is always written before the
//! in-memory hosting cache. Two watch channels mirror the cache: the list of
//! rendezvous channels to listen on and the `{seed, claimer, online}`
//! hosting snapshot.

use crate::invite::{channel_id, Invite, InviteCode};
use crate::store::backend::StorageBackend;
use crate::store::codes::CodeStore;
use crate::InviteError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Persisted claimer value of a code nobody has redeemed yet
pub const UNCLAIMED: &str = "unclaimed";

/// Who holds an invite code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Claimer {
    Unclaimed,
    Claimed(String),
}

impl Claimer {
    pub fn identity(&self) -> Option<&str> {
        match self {
            Claimer::Unclaimed => None,
            Claimer::Claimed(id) => Some(id),
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, Claimer::Claimed(_))
    }
}

impl From<String> for Claimer {
    fn from(value: String) -> Self {
        if value == UNCLAIMED {
            Claimer::Unclaimed
        } else {
            Claimer::Claimed(value)
        }
    }
}

impl From<Claimer> for String {
    fn from(claimer: Claimer) -> Self {
        match claimer {
            Claimer::Unclaimed => UNCLAIMED.to_string(),
            Claimer::Claimed(id) => id,
        }
    }
}

impl fmt::Display for Claimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identity().unwrap_or(UNCLAIMED))
    }
}

/// Annotated view of one hosted code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostingEntry {
    pub seed: String,
    pub claimer: Claimer,
    /// Only ever true for a concrete claimer
    pub online: bool,
}

/// Result of a claim that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The code moved from unclaimed to the caller
    Claimed,
    /// The caller already held the code; nothing changed
    AlreadyHeld,
}

pub struct ServerRegistry {
    self_id: String,
    namespace: String,
    store: RwLock<Option<CodeStore>>,
    entries: RwLock<BTreeMap<String, HostingEntry>>,
    /// Serializes every store mutation of a hosted code
    claim_lock: Mutex<()>,
    hosting_tx: watch::Sender<Vec<HostingEntry>>,
    channels_tx: watch::Sender<Vec<String>>,
}

impl ServerRegistry {
    pub fn new(self_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            namespace: namespace.into(),
            store: RwLock::new(None),
            entries: RwLock::new(BTreeMap::new()),
            claim_lock: Mutex::new(()),
            hosting_tx: watch::channel(Vec::new()).0,
            channels_tx: watch::channel(Vec::new()).0,
        }
    }

    pub fn is_started(&self) -> bool {
        self.store.read().is_some()
    }

    fn store(&self, op: &'static str) -> Result<CodeStore, InviteError> {
        self.store.read().clone().ok_or(InviteError::NotStarted(op))
    }

    /// Attach the store and restore every hosted code from it.
    /// Returns how many codes were restored; a second attach is a no-op.
    pub fn attach(&self, backend: Arc<dyn StorageBackend>) -> Result<usize, InviteError> {
        let mut slot = self.store.write();
        if slot.is_some() {
            return Ok(0);
        }

        let store = CodeStore::new(backend, &self.namespace);
        let codes: Vec<(String, Claimer)> = store
            .scan()
            .map_err(|e| InviteError::store("Could not read hosted invites", e))?;

        let restored = codes.len();
        {
            let mut entries = self.entries.write();
            for (seed, claimer) in codes {
                debug!("dhtinvite.channels emit {}", channel_id(&seed, &self.self_id));
                entries.insert(
                    seed.clone(),
                    HostingEntry {
                        seed,
                        claimer,
                        online: false,
                    },
                );
            }
        }
        *slot = Some(store);
        drop(slot);

        info!("Restored {} hosted invite(s) from {}", restored, self.namespace);
        self.publish();
        Ok(restored)
    }

    /// Host a fresh unclaimed code
    pub fn create(&self) -> Result<Invite, InviteError> {
        let store = self.store("create")?;
        let code = InviteCode::generate();

        let _hosting = self.claim_lock.lock();
        store
            .put(code.as_str(), &Claimer::Unclaimed)
            .map_err(|e| InviteError::store("Could not save invite", e))?;
        self.entries.write().insert(
            code.to_string(),
            HostingEntry {
                seed: code.to_string(),
                claimer: Claimer::Unclaimed,
                online: false,
            },
        );
        self.publish();

        Ok(Invite::new(code.into_string(), self.self_id.clone()))
    }

    /// Bind `seed` to `feed`. Claims are monotonic: only the same feed may
    /// claim an already claimed code again, and doing so changes nothing.
    pub fn claim(&self, seed: &str, feed: &str) -> Result<ClaimOutcome, InviteError> {
        let store = self.store("use")?;
        if feed.is_empty() || feed == UNCLAIMED {
            return Err(InviteError::InvalidRequest(format!(
                "{:?} is not a feed id",
                feed
            )));
        }

        let _claiming = self.claim_lock.lock();
        let current: Claimer = store
            .get(seed)
            .map_err(|e| InviteError::store("Could not read invite", e))?
            .ok_or(InviteError::NotFound)?;

        match current.identity() {
            Some(holder) if holder == feed => return Ok(ClaimOutcome::AlreadyHeld),
            Some(_) => return Err(InviteError::AlreadyClaimed),
            None => {}
        }

        debug!("dhtinvite.use will claim invite");
        let claimer = Claimer::Claimed(feed.to_string());
        store
            .put(seed, &claimer)
            .map_err(|e| InviteError::store("Could not claim invite", e))?;
        self.entries.write().insert(
            seed.to_string(),
            HostingEntry {
                seed: seed.to_string(),
                claimer,
                online: true,
            },
        );
        self.publish_hosting();

        Ok(ClaimOutcome::Claimed)
    }

    /// Stop hosting `seed`. Returns false when it was not hosted.
    pub fn remove(&self, seed: &str) -> Result<bool, InviteError> {
        let store = self.store("remove")?;
        // An in-flight claim must not write the code back after it is gone
        let _removing = self.claim_lock.lock();
        if !self.entries.read().contains_key(seed) {
            return Ok(false);
        }

        store
            .del(seed)
            .map_err(|e| InviteError::store("Could not delete invite", e))?;
        self.entries.write().remove(seed);
        self.publish();
        Ok(true)
    }

    /// Recompute every entry's `online` flag against the live remote set
    pub fn refresh_online(&self, online: &HashSet<String>) {
        {
            let mut entries = self.entries.write();
            for entry in entries.values_mut() {
                entry.online = entry
                    .claimer
                    .identity()
                    .map_or(false, |id| online.contains(id));
            }
        }
        self.publish_hosting();
    }

    pub fn entry(&self, seed: &str) -> Option<HostingEntry> {
        self.entries.read().get(seed).cloned()
    }

    pub fn entries(&self) -> Vec<HostingEntry> {
        self.entries.read().values().cloned().collect()
    }

    pub fn channels(&self) -> Vec<String> {
        self.entries
            .read()
            .keys()
            .map(|seed| channel_id(seed, &self.self_id))
            .collect()
    }

    pub fn subscribe_hosting(&self) -> watch::Receiver<Vec<HostingEntry>> {
        self.hosting_tx.subscribe()
    }

    pub fn subscribe_channels(&self) -> watch::Receiver<Vec<String>> {
        self.channels_tx.subscribe()
    }

    fn publish(&self) {
        self.channels_tx.send_replace(self.channels());
        self.publish_hosting();
    }

    fn publish_hosting(&self) {
        self.hosting_tx.send_replace(self.entries());
    }
}
