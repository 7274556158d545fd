//! Shared fixtures: in-process nodes wired through one loopback transport.

#![allow(dead_code)]

use accesschain::keys::NodeIdentity;
use accesschain::ledger::Ledger;
use accesschain::network::LoopbackTransport;
use accesschain::persistence::InMemoryStore;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

// RSA generation is slow; every test binary makes these once.
pub static ALPHA: Lazy<NodeIdentity> = Lazy::new(|| NodeIdentity::generate("10.0.0.1").unwrap());
pub static BRAVO: Lazy<NodeIdentity> = Lazy::new(|| NodeIdentity::generate("10.0.0.2").unwrap());
pub static CHARLIE: Lazy<NodeIdentity> = Lazy::new(|| NodeIdentity::generate("10.0.0.3").unwrap());

pub struct Cluster {
    pub transport: Arc<LoopbackTransport>,
    nodes: Mutex<Vec<Arc<Ledger>>>,
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            transport: LoopbackTransport::new(),
            nodes: Mutex::new(Vec::new()),
        }
    }

    /// Waits for every broadcast any node has in flight to be delivered.
    pub async fn settle(&self) {
        let nodes = self.nodes.lock().clone();
        for node in nodes {
            node.flush_broadcasts().await;
        }
    }

    /// A booted node with empty documents, reachable at its own address.
    pub fn node(&self, identity: &NodeIdentity) -> Arc<Ledger> {
        self.node_with_store(identity).0
    }

    /// Like [`Cluster::node`], also handing back the node's store so a test
    /// can rewrite its documents behind the ledger's back.
    pub fn node_with_store(&self, identity: &NodeIdentity) -> (Arc<Ledger>, InMemoryStore) {
        let store = InMemoryStore::new();
        let ledger = Arc::new(Ledger::new(identity.clone(), Arc::new(store.clone()), self.transport.clone()));
        ledger.boot().unwrap();
        self.transport.register(&ledger);
        self.nodes.lock().push(ledger.clone());
        (ledger, store)
    }
}
