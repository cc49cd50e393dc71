//! Shared fixtures for the invite integration tests

#![allow(dead_code)]

use dhtinvite_core::{
    Collaborators, DhtInvite, InviteConfig, LoopbackNetwork, MemoryPeerDirectory,
    MemorySocialGraph, MemoryStorage, RetryPolicy, StorageBackend,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct TestNode {
    pub node: DhtInvite,
    pub social: Arc<MemorySocialGraph>,
    pub directory: Arc<MemoryPeerDirectory>,
}

/// Short delays so retries and the follow pause don't slow the suite down
pub fn fast_config() -> InviteConfig {
    InviteConfig {
        retry: RetryPolicy {
            initial_delay_ms: 10,
            max_delay_ms: 100,
            max_attempts: u32::MAX,
        },
        follow_delay_ms: 1,
        ..InviteConfig::default()
    }
}

/// Build a node on `network`; it is reachable only after `network.attach`
pub fn build_node(
    network: &LoopbackNetwork,
    id: &str,
    backend: Arc<dyn StorageBackend>,
) -> TestNode {
    build_node_with(network, id, backend, fast_config())
}

pub fn build_node_with(
    network: &LoopbackNetwork,
    id: &str,
    backend: Arc<dyn StorageBackend>,
    config: InviteConfig,
) -> TestNode {
    let social = Arc::new(MemorySocialGraph::new());
    let directory = Arc::new(MemoryPeerDirectory::new());
    let node = DhtInvite::new(
        id,
        config,
        backend,
        Collaborators {
            connections: network.connector(id),
            social: social.clone(),
            directory: directory.clone(),
        },
    );
    TestNode {
        node,
        social,
        directory,
    }
}

/// Started, reachable node with in-memory storage
pub fn online_node(network: &LoopbackNetwork, id: &str) -> TestNode {
    let test_node = build_node(network, id, Arc::new(MemoryStorage::new()));
    test_node.node.start().expect("Failed to start node");
    network.attach(&test_node.node);
    test_node
}

/// Wait until the latest snapshot satisfies `predicate`
pub async fn eventually<T>(mut rx: watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) {
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(predicate))
        .await
        .expect("Timed out waiting for snapshot")
        .expect("Snapshot channel closed");
}
