//! In-process transport. Each registered ledger is reachable under its own
//! address; calls run the receiving node's handlers directly. Addresses can
//! be taken down to simulate unreachable peers.

use crate::blockchain::{Block, NOT_FOUND};
use crate::error::ChainError;
use crate::ledger::Ledger;
use crate::network::{AccessForm, Broadcast, JoinForm, JoinResponse, PeerTransport};
use crate::registry::PeerEntry;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

#[derive(Default)]
pub struct LoopbackTransport {
    nodes: RwLock<HashMap<String, Weak<Ledger>>>,
    down: RwLock<HashSet<String>>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `ledger` reachable at its own address.
    pub fn register(&self, ledger: &Arc<Ledger>) {
        self.nodes
            .write()
            .insert(ledger.address().to_string(), Arc::downgrade(ledger));
    }

    pub fn set_down(&self, address: &str, down: bool) {
        let mut set = self.down.write();
        if down {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    fn resolve(&self, address: &str) -> Result<Arc<Ledger>, ChainError> {
        if self.down.read().contains(address) {
            return Err(ChainError::Transport(format!("{} is unreachable", address)));
        }
        self.nodes
            .read()
            .get(address)
            .and_then(Weak::upgrade)
            .ok_or_else(|| ChainError::Transport(format!("No node at {}", address)))
    }
}

/// Errors a remote handler raises reach the caller the way an HTTP 500 would.
fn remote_failure(peer: &str, e: ChainError) -> ChainError {
    match e {
        ChainError::DecryptionFault | ChainError::Transport(_) => e,
        other => ChainError::Transport(format!("{} failed: {}", peer, other)),
    }
}

fn join_answer(result: Result<Vec<PeerEntry>, ChainError>, peer: &str) -> Result<JoinResponse, ChainError> {
    match result {
        Ok(peers) => Ok(JoinResponse::Peers(peers)),
        Err(ChainError::DecryptionFault) => Ok(JoinResponse::Fault(ChainError::DecryptionFault.to_string())),
        Err(e) => Err(remote_failure(peer, e)),
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn fetch_chain(&self, peer: &str) -> Result<String, ChainError> {
        self.resolve(peer)?.chain_json().map_err(|e| remote_failure(peer, e))
    }

    async fn network_identity(&self, peer: &str) -> Result<PeerEntry, ChainError> {
        Ok(self.resolve(peer)?.network_identity())
    }

    async fn request_join(&self, peer: &str, form: &JoinForm) -> Result<JoinResponse, ChainError> {
        let node = self.resolve(peer)?;
        join_answer(node.handle_request_join(form).await, peer)
    }

    async fn accept_join(&self, peer: &str, form: &JoinForm) -> Result<JoinResponse, ChainError> {
        let node = self.resolve(peer)?;
        join_answer(node.accept_join(form).await, peer)
    }

    async fn send_block(&self, peer: &str, route: Broadcast, block: &Block) -> Result<bool, ChainError> {
        let node = self.resolve(peer)?;
        let result = match route {
            Broadcast::LocalValidation => node.accept_local_validation(block.clone()).await,
            Broadcast::ValidateBlock => node.save_incoming_block(block.clone()).await,
        };
        result.map_err(|e| remote_failure(peer, e))
    }

    async fn verify_access_key_locally(&self, peer: &str, form: &AccessForm) -> Result<i64, ChainError> {
        let node = self.resolve(peer)?;
        let found = node
            .verify_access_key_locally(&form.door_id, &form.access_key)
            .map_err(|e| remote_failure(peer, e))?;
        Ok(found.map_or(NOT_FOUND, |n| n as i64))
    }
}
