//! Social-graph and peer-directory collaborators
//!
//! Redeeming an invite ends in both sides publishing a follow, and the
//! redeemer remembering the issuer's rendezvous address for reconnection.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// `{"type": "contact", "contact": <id>, "following": true}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "contact")]
pub struct FollowRecord {
    pub contact: String,
    pub following: bool,
}

impl FollowRecord {
    pub fn follow(contact: impl Into<String>) -> Self {
        Self {
            contact: contact.into(),
            following: true,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialGraph: Send + Sync {
    async fn publish(&self, record: FollowRecord) -> Result<(), String>;
}

pub trait PeerDirectory: Send + Sync {
    /// Keep `address` around for future reconnection
    fn remember(&self, address: &str, tags: &[String]);
}

/// Social graph that keeps published records in memory
#[derive(Default)]
pub struct MemorySocialGraph {
    records: Mutex<Vec<FollowRecord>>,
    failing: AtomicBool,
}

impl MemorySocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<FollowRecord> {
        self.records.lock().clone()
    }

    /// Identities followed so far, in publish order
    pub fn follows(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.following)
            .map(|r| r.contact.clone())
            .collect()
    }
}

#[async_trait]
impl SocialGraph for MemorySocialGraph {
    async fn publish(&self, record: FollowRecord) -> Result<(), String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("feed is not writable".to_string());
        }
        self.records.lock().push(record);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPeerDirectory {
    entries: Mutex<Vec<(String, Vec<String>)>>,
}

impl MemoryPeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, Vec<String>)> {
        self.entries.lock().clone()
    }
}

impl PeerDirectory for MemoryPeerDirectory {
    fn remember(&self, address: &str, tags: &[String]) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.iter_mut().find(|(a, _)| a == address) {
            existing.1 = tags.to_vec();
        } else {
            entries.push((address.to_string(), tags.to_vec()));
        }
    }
}
