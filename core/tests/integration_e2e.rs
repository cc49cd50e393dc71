//! End-to-end invite exchange between nodes on a shared loopback network
//!
//! Run with: cargo test --test integration_e2e

mod common;

use common::{build_node, build_node_with, eventually, fast_config, online_node};
use dhtinvite_core::{
    Claimer, ConnectionLayer, FollowRecord, Invite, InviteError, LoopbackNetwork, MemoryStorage,
    UseRequest,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_full_invite_exchange() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let bob = online_node(&network, "@bob");

    // Alice hosts a code and hands the string to Bob out of band
    let invite = alice.node.create().expect("Failed to create invite");
    let parsed = Invite::parse(&invite).expect("Created invite should parse");
    assert_eq!(parsed.remote_id(), "@alice");
    assert_eq!(alice.node.registry().channels(), vec![parsed.channel()]);

    // Bob redeems it
    let accepted = bob.node.accept(&invite).await.expect("Accept failed");
    assert!(accepted);

    // Alice sees Bob as the online claimer
    let seed = parsed.seed().to_string();
    eventually(alice.node.hosting(), |entries| {
        entries.iter().any(|e| {
            e.seed == seed && e.claimer == Claimer::Claimed("@bob".to_string()) && e.online
        })
    })
    .await;

    // Mutual follow
    assert_eq!(alice.social.follows(), vec!["@bob".to_string()]);
    assert_eq!(bob.social.follows(), vec!["@alice".to_string()]);
    assert_eq!(bob.social.records(), vec![FollowRecord::follow("@alice")]);

    // Bob remembers how to reach Alice and has nothing left to claim
    assert_eq!(
        bob.directory.entries(),
        vec![(parsed.dial_address(), vec!["dht".to_string()])]
    );
    assert!(bob.node.pending().borrow().is_empty());
}

#[tokio::test]
async fn test_accept_waits_for_unreachable_issuer() {
    let network = LoopbackNetwork::new();
    let alice = build_node(&network, "@alice", Arc::new(MemoryStorage::new()));
    alice.node.start().expect("Failed to start alice");
    let bob = online_node(&network, "@bob");

    let invite = alice.node.create().expect("Failed to create invite");

    // Alice is not reachable yet; Bob keeps dialing
    let redeemer = bob.node.clone();
    let pending_invite = invite.clone();
    let accept = tokio::spawn(async move { redeemer.accept(&pending_invite).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!accept.is_finished());
    assert_eq!(*bob.node.pending().borrow(), vec![invite.clone()]);

    // Alice comes online
    network.attach(&alice.node);
    let accepted = tokio::time::timeout(Duration::from_secs(10), accept)
        .await
        .expect("Accept never finished")
        .expect("Accept task panicked")
        .expect("Accept failed");
    assert!(accepted);
    assert!(bob.node.pending().borrow().is_empty());
    assert_eq!(alice.social.follows(), vec!["@bob".to_string()]);
}

#[tokio::test]
async fn test_second_redeemer_is_rejected() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let bob = online_node(&network, "@bob");
    let carol = online_node(&network, "@carol");

    let invite = alice.node.create().expect("Failed to create invite");
    assert!(bob.node.accept(&invite).await.expect("Bob's accept failed"));

    let err = carol
        .node
        .accept(&invite)
        .await
        .expect_err("Carol should not be able to claim Bob's invite");
    match err {
        InviteError::RemoteRejected(message) => {
            assert!(message.starts_with("Could not tell friend to use DHT invite"));
            assert!(message.contains("already claimed"), "{}", message);
        }
        other => panic!("Unexpected error: {:?}", other),
    }

    // Nothing changed on the issuer side and Carol still has it pending
    assert_eq!(alice.social.follows(), vec!["@bob".to_string()]);
    assert!(carol.social.follows().is_empty());
    assert_eq!(*carol.node.pending().borrow(), vec![invite]);
}

#[tokio::test]
async fn test_same_redeemer_accepting_twice() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let bob = online_node(&network, "@bob");

    let invite = alice.node.create().expect("Failed to create invite");
    assert!(bob.node.accept(&invite).await.expect("First accept failed"));
    assert!(bob.node.accept(&invite).await.expect("Second accept failed"));

    // Alice followed once, Bob's directory holds one address
    assert_eq!(alice.social.follows(), vec!["@bob".to_string()]);
    assert_eq!(bob.directory.entries().len(), 1);
    assert!(bob.node.pending().borrow().is_empty());
}

#[tokio::test]
async fn test_unknown_seed_is_rejected() {
    let network = LoopbackNetwork::new();
    let _alice = online_node(&network, "@alice");
    let bob = online_node(&network, "@bob");

    let forged = Invite::new("bm90LWhvc3RlZA==", "@alice").to_string();
    let err = bob
        .node
        .accept(&forged)
        .await
        .expect_err("Forged invite should be rejected");
    match err {
        InviteError::RemoteRejected(message) => {
            assert!(message.contains("does not exist"), "{}", message)
        }
        other => panic!("Unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_invite_is_not_recorded() {
    let network = LoopbackNetwork::new();
    let bob = online_node(&network, "@bob");

    let err = bob
        .node
        .accept("dht:only-two")
        .await
        .expect_err("Malformed invite should fail");
    assert!(matches!(err, InviteError::MalformedInvite(_)));
    assert!(bob.node.pending().borrow().is_empty());
}

#[tokio::test]
async fn test_online_flag_follows_session_lifetime() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");

    let invite = alice.node.create().expect("Failed to create invite");
    let parsed = Invite::parse(&invite).expect("Created invite should parse");
    let seed = parsed.seed().to_string();

    // Dave talks to Alice over a raw session instead of a full node
    let dave = network.connector("@dave");
    let session = dave
        .connect(&parsed.dial_address())
        .await
        .expect("Failed to connect");
    let response = session
        .use_invite(UseRequest {
            seed: seed.clone(),
            feed: "@dave".to_string(),
        })
        .await
        .expect("Use failed");
    assert_eq!(response.feed, "@alice");

    eventually(alice.node.hosting(), |entries| {
        entries.iter().any(|e| e.seed == seed && e.online)
    })
    .await;

    // Closing the session takes Dave offline
    drop(session);
    eventually(alice.node.hosting(), |entries| {
        entries.iter().any(|e| e.seed == seed && !e.online)
    })
    .await;
    assert!(!alice.node.online().is_online("@dave"));
}

#[tokio::test]
async fn test_removed_invite_can_no_longer_be_used() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let bob = online_node(&network, "@bob");

    let invite = alice.node.create().expect("Failed to create invite");
    assert!(alice.node.remove(&invite).expect("Remove failed"));
    assert!(alice.node.channels().borrow().is_empty());

    let err = bob
        .node
        .accept(&invite)
        .await
        .expect_err("Removed invite should be rejected");
    assert!(matches!(err, InviteError::RemoteRejected(_)));

    // Bob gives up on it
    assert!(bob.node.remove(&invite).expect("Remove failed"));
    assert!(bob.node.pending().borrow().is_empty());
}

#[tokio::test]
async fn test_hosting_stream_replays_latest_snapshot() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");

    alice.node.create().expect("Failed to create invite");
    alice.node.create().expect("Failed to create invite");

    // A late subscriber gets the current state first
    let mut hosting = alice.node.hosting_stream();
    let snapshot = hosting.next().await.expect("Stream ended");
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot
        .iter()
        .all(|e| e.claimer == Claimer::Unclaimed && !e.online));

    let mut channels = alice.node.channels_stream();
    let channels = channels.next().await.expect("Stream ended");
    assert_eq!(channels.len(), 2);
    assert!(channels.iter().all(|c| c.ends_with(":@alice")));
}

#[tokio::test]
async fn test_failed_follow_still_completes_redemption() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let bob = online_node(&network, "@bob");
    let invite = alice.node.create().expect("Failed to create invite");
    let parsed = Invite::parse(&invite).expect("Created invite should parse");

    // Bob's own feed rejects writes
    bob.social.set_failing(true);
    let err = bob
        .node
        .accept(&invite)
        .await
        .expect_err("Accept should report the failed follow");
    match err {
        InviteError::PublishFailure(message) => {
            assert!(message.contains("@alice"), "{}", message)
        }
        other => panic!("Unexpected error: {:?}", other),
    }

    // The invite is consumed all the same
    assert!(bob.node.pending().borrow().is_empty());
    assert_eq!(
        bob.directory.entries(),
        vec![(parsed.dial_address(), vec!["dht".to_string()])]
    );
    assert_eq!(
        alice.node.registry().entry(parsed.seed()).map(|e| e.claimer),
        Some(Claimer::Claimed("@bob".to_string()))
    );
    assert_eq!(alice.social.follows(), vec!["@bob".to_string()]);
    assert!(bob.social.follows().is_empty());
}

#[tokio::test]
async fn test_follow_waits_for_settling_delay() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let mut config = fast_config();
    config.follow_delay_ms = 200;
    let bob = build_node_with(&network, "@bob", Arc::new(MemoryStorage::new()), config);
    bob.node.start().expect("Failed to start bob");
    network.attach(&bob.node);

    let invite = alice.node.create().expect("Failed to create invite");
    let started = Instant::now();
    assert!(bob.node.accept(&invite).await.expect("Accept failed"));

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(bob.social.follows(), vec!["@alice".to_string()]);
}

#[tokio::test]
async fn test_broken_session_is_transport_failure() {
    let network = LoopbackNetwork::new();
    let alice = online_node(&network, "@alice");
    let bob = online_node(&network, "@bob");

    let first = alice.node.create().expect("Failed to create invite");
    let second = alice.node.create().expect("Failed to create invite");
    assert!(bob.node.accept(&first).await.expect("First accept failed"));

    // Alice drops off while Bob still holds the session from the first accept
    network.detach("@alice");
    let err = bob
        .node
        .accept(&second)
        .await
        .expect_err("Accept over a dead session should fail");
    match err {
        InviteError::TransportFailure(message) => {
            assert!(message.starts_with("Could not tell friend to use DHT invite"));
        }
        other => panic!("Unexpected error: {:?}", other),
    }
    assert_eq!(*bob.node.pending().borrow(), vec![second.clone()]);

    // The dead session was dropped, so the retry dials afresh
    network.attach(&alice.node);
    assert!(bob.node.accept(&second).await.expect("Retry failed"));
    assert!(bob.node.pending().borrow().is_empty());
}
