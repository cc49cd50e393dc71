//! Hosted codes and pending redemptions survive a restart on sled storage
//!
//! Run with: cargo test --test test_persistence_restart

mod common;

use common::{build_node, eventually, online_node};
use dhtinvite_core::{
    ClaimTracker, Claimer, Invite, LoopbackNetwork, ServerRegistry, SledStorage, StorageBackend,
    UseRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn open(path: &std::path::Path) -> Arc<dyn StorageBackend> {
    let path = path.to_str().expect("Temp path is not UTF-8");
    Arc::new(SledStorage::new(path).expect("Failed to open sled"))
}

#[tokio::test]
async fn test_hosted_codes_survive_restart() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("alice");

    // First run: host two codes and let one be claimed
    let (claimed, unclaimed) = {
        let registry = ServerRegistry::new("@alice", "dhtServerCodes");
        registry.attach(open(&path)).expect("Attach failed");
        let claimed = registry.create().expect("Create failed");
        let unclaimed = registry.create().expect("Create failed");
        registry.claim(claimed.seed(), "@bob").expect("Claim failed");
        (claimed, unclaimed)
    };

    // Second run
    let network = LoopbackNetwork::new();
    let alice = build_node(&network, "@alice", open(&path));
    alice.node.start().expect("Failed to restart");

    let mut channels = alice.node.channels().borrow().clone();
    channels.sort();
    let mut expected = vec![claimed.channel(), unclaimed.channel()];
    expected.sort();
    assert_eq!(channels, expected);

    let restored = alice
        .node
        .registry()
        .entry(claimed.seed())
        .expect("Claimed code was lost");
    assert_eq!(restored.claimer, Claimer::Claimed("@bob".to_string()));
    assert!(!restored.online, "Nobody is connected right after a restart");
    assert_eq!(
        alice.node.registry().entry(unclaimed.seed()).map(|e| e.claimer),
        Some(Claimer::Unclaimed)
    );
}

#[tokio::test]
async fn test_pending_redemption_resumes_on_start() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("bob");
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let invite = alice.node.create().expect("Failed to create invite");
    let seed = Invite::parse(&invite)
        .expect("Created invite should parse")
        .seed()
        .to_string();

    // First run: Bob noted the invite but stopped before reaching Alice
    {
        let claims = ClaimTracker::new("dhtClientCodes");
        claims.attach(open(&path)).expect("Attach failed");
        claims.record(&invite).expect("Record failed");
    }

    // Second run picks the redemption back up
    let bob = build_node(&network, "@bob", open(&path));
    bob.node.start().expect("Failed to restart");

    eventually(bob.node.pending(), |pending| pending.is_empty()).await;
    assert_eq!(
        alice.node.registry().entry(&seed).map(|e| e.claimer),
        Some(Claimer::Claimed("@bob".to_string()))
    );
    assert_eq!(alice.social.follows(), vec!["@bob".to_string()]);
}

#[tokio::test]
async fn test_restart_after_claim_landed_is_idempotent() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("bob");
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let invite = alice.node.create().expect("Failed to create invite");
    let seed = Invite::parse(&invite)
        .expect("Created invite should parse")
        .seed()
        .to_string();

    // First run: the claim reached Alice but Bob crashed before clearing it
    {
        let claims = ClaimTracker::new("dhtClientCodes");
        claims.attach(open(&path)).expect("Attach failed");
        claims.record(&invite).expect("Record failed");
    }
    alice
        .node
        .use_invite(UseRequest {
            seed,
            feed: "@bob".to_string(),
        })
        .await
        .expect("Use failed");

    let bob = build_node(&network, "@bob", open(&path));
    bob.node.start().expect("Failed to restart");

    // The retry is accepted without claiming anything new
    eventually(bob.node.pending(), |pending| pending.is_empty()).await;
    assert_eq!(alice.social.follows(), vec!["@bob".to_string()]);

    // Bob follows and remembers Alice right after clearing the record
    tokio::time::timeout(Duration::from_secs(10), async {
        while bob.directory.entries().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Bob never remembered Alice");
    assert!(bob.directory.entries()[0].0.ends_with("~shs:@alice"));
    assert_eq!(bob.social.follows(), vec!["@alice".to_string()]);
}
