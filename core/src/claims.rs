//! Client Claim Tracker: invites this node has promised to redeem
//!
//! A pending record is written before any network I/O and deleted only once
//! the issuer confirmed the claim, so an interrupted redemption is picked up
//! again on the next start.

use crate::store::backend::StorageBackend;
use crate::store::codes::CodeStore;
use crate::InviteError;
use parking_lot::RwLock;
use serde::de::IgnoredAny;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub struct ClaimTracker {
    namespace: String,
    store: RwLock<Option<CodeStore>>,
    pending: RwLock<BTreeSet<String>>,
    pending_tx: watch::Sender<Vec<String>>,
}

impl ClaimTracker {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            store: RwLock::new(None),
            pending: RwLock::new(BTreeSet::new()),
            pending_tx: watch::channel(Vec::new()).0,
        }
    }

    pub fn is_started(&self) -> bool {
        self.store.read().is_some()
    }

    fn store(&self, op: &'static str) -> Result<CodeStore, InviteError> {
        self.store.read().clone().ok_or(InviteError::NotStarted(op))
    }

    /// Attach the store and return every invite still waiting for redemption.
    /// A second attach is a no-op and returns nothing.
    pub fn attach(&self, backend: Arc<dyn StorageBackend>) -> Result<Vec<String>, InviteError> {
        let mut slot = self.store.write();
        if slot.is_some() {
            return Ok(Vec::new());
        }

        let store = CodeStore::new(backend, &self.namespace);
        // Only the keys matter
        let records: Vec<(String, IgnoredAny)> = store
            .scan()
            .map_err(|e| InviteError::store("Could not read to-claim invites", e))?;
        let invites: Vec<String> = records.into_iter().map(|(invite, _)| invite).collect();

        self.pending.write().extend(invites.iter().cloned());
        *slot = Some(store);
        drop(slot);

        if !invites.is_empty() {
            info!("{} invite(s) still to claim from {}", invites.len(), self.namespace);
        }
        self.publish();
        Ok(invites)
    }

    /// Durably note that `invite` must be redeemed
    pub fn record(&self, invite: &str) -> Result<(), InviteError> {
        let store = self.store("accept")?;
        store
            .put(invite, &true)
            .map_err(|e| InviteError::store("Could not save to-claim invite locally", e))?;
        self.pending.write().insert(invite.to_string());
        self.publish();
        Ok(())
    }

    /// The issuer confirmed `invite`; forget it
    pub fn complete(&self, invite: &str) -> Result<(), InviteError> {
        let store = self.store("accept")?;
        store
            .del(invite)
            .map_err(|e| InviteError::store("Could not delete to-claim invite", e))?;
        self.pending.write().remove(invite);
        self.publish();
        Ok(())
    }

    /// Drop a pending record without redeeming it. Returns false when absent.
    pub fn remove(&self, invite: &str) -> Result<bool, InviteError> {
        let store = self.store("remove")?;
        if !self.pending.read().contains(invite) {
            return Ok(false);
        }
        store
            .del(invite)
            .map_err(|e| InviteError::store("Could not delete to-claim invite", e))?;
        self.pending.write().remove(invite);
        self.publish();
        Ok(true)
    }

    pub fn is_pending(&self, invite: &str) -> bool {
        self.pending.read().contains(invite)
    }

    pub fn pending(&self) -> Vec<String> {
        self.pending.read().iter().cloned().collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.pending_tx.subscribe()
    }

    fn publish(&self) {
        self.pending_tx.send_replace(self.pending());
    }
}
