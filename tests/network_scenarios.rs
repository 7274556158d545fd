//! Multi-node behaviour: founding, joining, broadcast, reconciliation and
//! majority votes, all over the in-process loopback transport.

mod common;

use accesschain::blockchain::{self, Block};
use accesschain::ledger::{Ledger, NodeState};
use accesschain::membership::JoinOutcome;
use accesschain::network::{Broadcast, PeerTransport};
use accesschain::persistence::Persistence;
use accesschain::transaction::build_access_key_transaction;
use common::{Cluster, ALPHA, BRAVO, CHARLIE};
use std::sync::Arc;

async fn three_node_network(cluster: &Cluster) -> (Arc<Ledger>, Arc<Ledger>, Arc<Ledger>) {
    let a = cluster.node(&ALPHA);
    let b = cluster.node(&BRAVO);
    let c = cluster.node(&CHARLIE);

    assert_eq!(a.join_network(None).await.unwrap(), JoinOutcome::Founded);
    b.join_network(Some(&ALPHA.address)).await.unwrap();
    c.join_network(Some(&ALPHA.address)).await.unwrap();
    cluster.settle().await;
    (a, b, c)
}

#[tokio::test]
async fn test_founder_creates_genesis_and_finds_nothing() {
    let cluster = Cluster::new();
    let a = cluster.node(&ALPHA);
    assert_eq!(a.state(), NodeState::AwaitingGenesisOrJoin);

    assert_eq!(a.join_network(None).await.unwrap(), JoinOutcome::Founded);
    assert_eq!(a.state(), NodeState::Active);

    let chain = a.chain().unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].block_number, 0);
    assert!(a.lookup_by_access_key("key-1").unwrap().is_none());
    assert!(a.lookup_by_door_id("door-1").unwrap().is_none());
}

#[tokio::test]
async fn test_join_through_unfounded_directory_fails() {
    // A directory without a chain lists only itself and cannot accept anyone.
    let cluster = Cluster::new();
    let a = cluster.node(&ALPHA);
    let b = cluster.node(&BRAVO);
    assert!(b.join_network(Some(&ALPHA.address)).await.is_err());
    assert!(a.chain().unwrap().is_empty());
    assert!(b.chain().unwrap().is_empty());
    assert!(a.registry().unwrap().is_empty());
}

#[tokio::test]
async fn test_join_gives_identical_chains_and_mutual_registries() {
    let cluster = Cluster::new();
    let a = cluster.node(&ALPHA);
    let b = cluster.node(&BRAVO);

    a.join_network(None).await.unwrap();
    let outcome = b.join_network(Some(&ALPHA.address)).await.unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::Joined {
            via: ALPHA.address.clone(),
            peers: 1
        }
    );

    assert_eq!(a.registry().unwrap().entries(), &[BRAVO.self_entry()]);
    assert_eq!(b.registry().unwrap().entries(), &[ALPHA.self_entry()]);

    let chain_a = a.chain().unwrap();
    assert_eq!(chain_a.len(), 2);
    assert_eq!(chain_a, b.chain().unwrap());
    assert!(chain_a[1].is_membership());
    assert_eq!(b.state(), NodeState::Active);

    // Both nodes hold every key the chain needs.
    assert!(blockchain::verify_chain(&chain_a, &a.key_ring().unwrap()));
    assert!(blockchain::verify_chain(&chain_a, &b.key_ring().unwrap()));
}

#[tokio::test]
async fn test_third_node_membership_propagates() {
    let cluster = Cluster::new();
    let (a, b, c) = three_node_network(&cluster).await;

    // C was accepted by B (first in A's directory), and A learned of C
    // through the relayed membership block.
    for node in [&a, &b, &c] {
        assert_eq!(node.chain().unwrap().len(), 3);
        assert_eq!(node.registry().unwrap().len(), 2);
    }
    assert_eq!(a.chain().unwrap(), c.chain().unwrap());
    assert_eq!(b.chain().unwrap(), c.chain().unwrap());
    assert!(a.registry().unwrap().entries().contains(&CHARLIE.self_entry()));
}

#[tokio::test]
async fn test_saved_grant_is_broadcast_and_found_on_peer() {
    let cluster = Cluster::new();
    let a = cluster.node(&ALPHA);
    let b = cluster.node(&BRAVO);
    a.join_network(None).await.unwrap();
    b.join_network(Some(&ALPHA.address)).await.unwrap();

    let block = a.save_transaction("door-1", "key-1").await.unwrap();
    assert_eq!(block.block_number, 2);
    assert_eq!(a.chain().unwrap().last(), Some(&block));
    cluster.settle().await;

    assert_eq!(b.lookup_by_access_key("key-1").unwrap(), Some(block.clone()));
    assert_eq!(b.lookup_by_door_id("door-1").unwrap(), Some(block.clone()));
    assert_eq!(b.verify_access_key_locally("door-1", "key-1").unwrap(), Some(block.block_number));
    assert_eq!(b.verify_access_key_locally("door-1", "key-2").unwrap(), None);
}

#[tokio::test]
async fn test_tampered_block_rejected_on_validate_path() {
    let cluster = Cluster::new();
    let a = cluster.node(&ALPHA);
    let b = cluster.node(&BRAVO);
    a.join_network(None).await.unwrap();
    b.join_network(Some(&ALPHA.address)).await.unwrap();

    // Stamp a block on A without broadcasting it.
    let tx = build_access_key_transaction("door-7", "key-7", &ALPHA).unwrap();
    let genuine = a.create_block(tx.into()).await.unwrap();

    let mut tampered: Block = genuine.clone();
    let mut stamp: Vec<char> = tampered.integrity_stamp.chars().collect();
    stamp[5] = if stamp[5] == 'x' { 'y' } else { 'x' };
    tampered.integrity_stamp = stamp.into_iter().collect();

    let accepted = cluster
        .transport
        .send_block(&BRAVO.address, Broadcast::ValidateBlock, &tampered)
        .await
        .unwrap();
    assert!(!accepted);
    assert_eq!(b.chain().unwrap().len(), 2);

    let accepted = cluster
        .transport
        .send_block(&BRAVO.address, Broadcast::ValidateBlock, &genuine)
        .await
        .unwrap();
    assert!(accepted);
    assert_eq!(b.chain().unwrap().len(), 3);
}

#[tokio::test]
async fn test_reliability_vote_ignores_unreachable_peers() {
    let cluster = Cluster::new();
    let (a, b, _c) = three_node_network(&cluster).await;

    // Broadcast grant: everyone holds it.
    a.save_transaction("door-1", "key-1").await.unwrap();
    cluster.settle().await;
    assert!(b.request_reliability_verification("door-1", "key-1").await.unwrap());

    // Grant only A holds: A says yes, B and C say no.
    let tx = build_access_key_transaction("door-2", "key-2", &ALPHA).unwrap();
    a.create_block(tx.into()).await.unwrap();
    assert!(!b.request_reliability_verification("door-2", "key-2").await.unwrap());

    // With C unreachable it is one against one, and ties pass.
    cluster.transport.set_down(&CHARLIE.address, true);
    assert!(b.request_reliability_verification("door-2", "key-2").await.unwrap());

    // Nobody holds this one.
    assert!(!b.request_reliability_verification("door-3", "key-3").await.unwrap());
}

#[tokio::test]
async fn test_chain_integrity_adopts_longest_valid_chain() {
    let cluster = Cluster::new();
    let (a, b, c) = three_node_network(&cluster).await;

    let tx = build_access_key_transaction("door-9", "key-9", &ALPHA).unwrap();
    a.create_block(tx.into()).await.unwrap();
    assert_eq!(b.chain().unwrap().len(), 3);

    assert!(b.request_chain_integrity().await.unwrap());
    assert_eq!(b.chain().unwrap(), a.chain().unwrap());
    assert_eq!(b.verify_access_key_locally("door-9", "key-9").unwrap(), Some(3));

    // C keeps its chain when every peer is down.
    cluster.transport.set_down(&ALPHA.address, true);
    cluster.transport.set_down(&BRAVO.address, true);
    let before = c.chain_json().unwrap();
    assert!(c.request_chain_integrity().await.unwrap());
    assert_eq!(c.chain_json().unwrap(), before);
}

#[tokio::test]
async fn test_chain_integrity_is_idempotent_for_longest_chain() {
    let cluster = Cluster::new();
    let (a, _b, _c) = three_node_network(&cluster).await;

    let tx = build_access_key_transaction("door-4", "key-4", &ALPHA).unwrap();
    a.create_block(tx.into()).await.unwrap();

    let before = a.chain_json().unwrap();
    assert!(a.request_chain_integrity().await.unwrap());
    assert_eq!(a.chain_json().unwrap(), before);
}

#[tokio::test]
async fn test_invalid_longer_chain_is_not_adopted() {
    let cluster = Cluster::new();
    let a = cluster.node(&ALPHA);
    let (b, b_store) = cluster.node_with_store(&BRAVO);
    a.join_network(None).await.unwrap();
    b.join_network(Some(&ALPHA.address)).await.unwrap();

    // B's document gains a block whose number breaks the sequence.
    let tx = build_access_key_transaction("door-5", "key-5", &BRAVO).unwrap();
    let mut longer = b.chain().unwrap();
    let bad = blockchain::seal_block(9, Some(&longer[1]), tx.into(), &BRAVO).unwrap();
    longer.push(bad);
    assert!(!blockchain::verify_chain(&longer, &b.key_ring().unwrap()));
    b_store.store_chain(&longer).unwrap();

    let before = a.chain_json().unwrap();
    assert!(a.request_chain_integrity().await.unwrap());
    assert_eq!(a.chain_json().unwrap(), before);

    // B itself falls back to the valid chain A serves.
    assert!(b.request_chain_integrity().await.unwrap());
    assert_eq!(b.chain().unwrap(), a.chain().unwrap());
}

#[tokio::test]
async fn test_chain_integrity_without_valid_candidate_changes_nothing() {
    let cluster = Cluster::new();
    let (a, a_store) = cluster.node_with_store(&ALPHA);
    a.join_network(None).await.unwrap();
    a.save_transaction("door-1", "key-1").await.unwrap();

    // The only candidate, our own chain, has a broken link.
    let mut broken = a.chain().unwrap();
    broken[1].previous_integrity_stamp = "0".repeat(256);
    a_store.store_chain(&broken).unwrap();
    let before = a.chain_json().unwrap();

    assert!(!a.request_chain_integrity().await.unwrap());
    assert_eq!(a.chain_json().unwrap(), before);
}

#[tokio::test]
async fn test_network_integrity_refreshes_and_tolerates_faults() {
    let cluster = Cluster::new();
    let (a, _b, _c) = three_node_network(&cluster).await;

    assert!(a.request_network_integrity().await.unwrap());
    assert_eq!(a.registry().unwrap().len(), 2);

    cluster.transport.set_down(&BRAVO.address, true);
    cluster.transport.set_down(&CHARLIE.address, true);
    assert!(!a.request_network_integrity().await.unwrap());
    assert_eq!(a.registry().unwrap().len(), 2);
}
