//! Block and chain management for AccessChain
//!
//! [`Ledger`] owns one node's view of the network: its identity, its two
//! persisted documents and the transport it reaches peers through. Every
//! read-modify-write of a document happens under a single writer lock, and the
//! lock is never held while waiting on a peer.

use crate::blockchain::{self, Block, Chain, KeyRing, NOT_FOUND};
use crate::crypto;
use crate::error::ChainError;
use crate::keys::NodeIdentity;
use crate::network::{AccessForm, Broadcast, PeerTransport};
use crate::persistence::Persistence;
use crate::registry::{PeerEntry, PeerRegistry};
use crate::sync::{first_success, gather_all};
use crate::transaction::{build_access_key_transaction, build_membership_transaction, MembershipTx, Transaction};
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    /// Documents not loaded yet.
    Uninitialized,
    /// Loaded, but the chain is empty: the node must found or join a network.
    AwaitingGenesisOrJoin,
    Active,
}

/// Summary served by the `node-state` route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub state: NodeState,
    pub address: String,
    pub chain_length: usize,
    pub peers: Vec<String>,
}

/// Outcome of a reliability vote. Peers that could not be reached are
/// counted in `silent` and never influence the verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReliabilityTally {
    pub success: usize,
    pub fail: usize,
    pub silent: usize,
}

impl ReliabilityTally {
    pub fn record(&mut self, answer: &Result<i64, ChainError>) {
        match answer {
            Ok(n) if *n == NOT_FOUND => self.fail += 1,
            Ok(_) => self.success += 1,
            Err(_) => self.silent += 1,
        }
    }

    pub fn verdict(&self) -> bool {
        self.success >= self.fail
    }
}

pub struct Ledger {
    identity: NodeIdentity,
    store: Arc<dyn Persistence>,
    transport: Arc<dyn PeerTransport>,
    state: RwLock<NodeState>,
    write_lock: Mutex<()>,
    broadcasts: SyncMutex<Vec<JoinHandle<()>>>,
}

impl Ledger {
    pub fn new(identity: NodeIdentity, store: Arc<dyn Persistence>, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            identity,
            store,
            transport,
            state: RwLock::new(NodeState::Uninitialized),
            write_lock: Mutex::new(()),
            broadcasts: SyncMutex::new(Vec::new()),
        }
    }

    /// Loads the documents and settles the initial state.
    pub fn boot(&self) -> Result<NodeState, ChainError> {
        let chain = self.store.load_chain()?;
        let registry = self.store.load_registry()?;
        let state = if chain.is_empty() {
            NodeState::AwaitingGenesisOrJoin
        } else {
            NodeState::Active
        };
        self.set_state(state);
        info!(
            address = %self.identity.address,
            chain_length = chain.len(),
            peers = registry.len(),
            state = ?state,
            "Ledger loaded"
        );
        Ok(state)
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn address(&self) -> &str {
        &self.identity.address
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        *self.state.write() = state;
    }

    pub fn chain(&self) -> Result<Chain, ChainError> {
        self.store.load_chain()
    }

    /// The chain document as served to peers.
    pub fn chain_json(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string(&self.store.load_chain()?)?)
    }

    pub fn registry(&self) -> Result<PeerRegistry, ChainError> {
        self.store.load_registry()
    }

    pub fn peer_addresses(&self) -> Result<Vec<String>, ChainError> {
        Ok(self.store.load_registry()?.addresses())
    }

    /// Keys of every known peer plus our own.
    pub fn key_ring(&self) -> Result<KeyRing, ChainError> {
        Ok(KeyRing::build(&self.store.load_registry()?, &self.identity))
    }

    pub fn status(&self) -> Result<NodeStatus, ChainError> {
        Ok(NodeStatus {
            state: self.state(),
            address: self.identity.address.clone(),
            chain_length: self.store.load_chain()?.len(),
            peers: self.peer_addresses()?,
        })
    }

    pub(crate) async fn lock_documents(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub(crate) fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    /// Founds a network: block 0 records this node's own membership.
    /// Returns false, changing nothing, when the chain already has blocks.
    pub async fn create_genesis_block(&self) -> Result<bool, ChainError> {
        let _guard = self.lock_documents().await;
        let mut chain = self.store.load_chain()?;
        if !chain.is_empty() {
            warn!(length = chain.len(), "Refusing to create a genesis block on a non-empty chain");
            return Ok(false);
        }

        let own = &self.identity;
        let tx = build_membership_transaction(
            &own.address,
            &own.network.public_pem,
            &own.transaction.private_pem,
            own,
        )?;
        let genesis = blockchain::seal_block(0, None, tx.into(), own)?;
        chain.push(genesis);
        self.store.store_chain(&chain)?;
        self.set_state(NodeState::Active);

        info!(address = %own.address, "Genesis block created");
        Ok(true)
    }

    /// Stamps `transaction` on top of the current chain and persists it.
    pub async fn create_block(&self, transaction: Transaction) -> Result<Block, ChainError> {
        let _guard = self.lock_documents().await;
        let mut chain = self.store.load_chain()?;
        let previous = chain.last().ok_or_else(|| {
            ChainError::InvalidState("Chain is empty; found or join a network first".to_string())
        })?;

        let block = blockchain::seal_block(chain.len() as u64, Some(previous), transaction, &self.identity)?;
        chain.push(block.clone());
        self.store.store_chain(&chain)?;

        info!(block = block.block_number, kind = block.transaction.kind(), "Block created");
        Ok(block)
    }

    /// Sends `block` to every target except ourselves in a detached task and
    /// returns at once. Failures are logged per target and never reach the caller.
    pub fn deploy_block(&self, block: &Block, targets: &[String], route: Broadcast) {
        let targets: Vec<String> = targets
            .iter()
            .filter(|t| t.as_str() != self.identity.address)
            .cloned()
            .collect();
        if targets.is_empty() {
            debug!(block = block.block_number, "No peers to broadcast to");
            return;
        }

        let transport = Arc::clone(&self.transport);
        let block = block.clone();
        let handle = tokio::spawn(async move {
            let results = gather_all(&targets, |peer| transport.send_block(peer, route, &block)).await;

            let mut accepted = 0;
            for (peer, result) in results {
                match result {
                    Ok(true) => {
                        accepted += 1;
                        debug!(peer = %peer, block = block.block_number, "Block delivered");
                    }
                    Ok(false) => warn!(peer = %peer, block = block.block_number, "Peer rejected block"),
                    Err(e) => warn!(peer = %peer, block = block.block_number, error = %e, "Block delivery failed"),
                }
            }
            info!(block = block.block_number, accepted, targets = targets.len(), "Block broadcast finished");
        });

        let mut pending = self.broadcasts.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Waits until every broadcast started by this node has finished.
    pub async fn flush_broadcasts(&self) {
        loop {
            let pending = std::mem::take(&mut *self.broadcasts.lock());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Broadcast task did not complete");
                }
            }
        }
    }

    /// Adopts the chain of the first peer, in registry order, that answers.
    /// The answer is taken as is. Returns false when no peer answered.
    pub async fn consensus_block(&self) -> Result<bool, ChainError> {
        let peers = self.peer_addresses()?;
        self.adopt_first_chain(&peers).await
    }

    /// Same as [`Ledger::consensus_block`], but asks `preferred` first.
    pub async fn consensus_block_via(&self, preferred: &str) -> Result<bool, ChainError> {
        let mut peers = vec![preferred.to_string()];
        peers.extend(self.peer_addresses()?.into_iter().filter(|p| p != preferred));
        self.adopt_first_chain(&peers).await
    }

    async fn adopt_first_chain(&self, peers: &[String]) -> Result<bool, ChainError> {
        let fetched = first_success(peers, |peer| async move {
            let body = self.transport.fetch_chain(peer).await?;
            serde_json::from_str::<Chain>(&body)
                .map_err(|e| ChainError::Transport(format!("Unreadable chain: {}", e)))
        })
        .await;

        let Some((peer, chain)) = fetched else {
            warn!(peers = peers.len(), "No peer supplied a starting chain");
            return Ok(false);
        };

        let _guard = self.lock_documents().await;
        self.store.store_chain(&chain)?;
        if !chain.is_empty() {
            self.set_state(NodeState::Active);
        }
        info!(peer = %peer, length = chain.len(), "Adopted starting chain");
        Ok(true)
    }

    /// Longest-valid-chain reconciliation across every peer and ourselves.
    /// Returns false, leaving the chain untouched, when no candidate validates.
    pub async fn request_chain_integrity(&self) -> Result<bool, ChainError> {
        let peers = self.peer_addresses()?;
        let mut candidates: Vec<(String, String)> = Vec::with_capacity(peers.len() + 1);

        for (peer, result) in gather_all(&peers, |peer| self.transport.fetch_chain(peer)).await {
            match result {
                Ok(body) => candidates.push((peer.to_string(), body)),
                Err(e) => debug!(peer = %peer, error = %e, "Skipping unreachable peer"),
            }
        }
        candidates.push((self.identity.address.clone(), self.chain_json()?));

        let keys = self.key_ring()?;
        let mut winner: Option<(String, usize, Chain)> = None;
        for (source, body) in candidates {
            let chain: Chain = match serde_json::from_str(&body) {
                Ok(chain) => chain,
                Err(e) => {
                    debug!(peer = %source, error = %e, "Discarding unreadable chain");
                    continue;
                }
            };
            if let Err(e) = blockchain::check_chain(&chain, &keys) {
                debug!(peer = %source, error = %e, "Discarding invalid chain");
                continue;
            }
            // Ties keep the earlier candidate.
            if winner.as_ref().map_or(true, |(_, len, _)| body.len() > *len) {
                winner = Some((source, body.len(), chain));
            }
        }

        let Some((source, _, chain)) = winner else {
            warn!("Chain integrity failed: no candidate chain validated");
            return Ok(false);
        };

        let _guard = self.lock_documents().await;
        let current = self.store.load_chain()?;
        if current != chain {
            self.store.store_chain(&chain)?;
            info!(source = %source, from = current.len(), to = chain.len(), "Chain replaced");
        } else {
            debug!(length = chain.len(), "Local chain already current");
        }
        if !chain.is_empty() {
            self.set_state(NodeState::Active);
        }
        Ok(true)
    }

    /// Accepts a block from a peer if its stamp checks out. Membership blocks
    /// also bring their peer into the registry. A block already on the chain is
    /// acknowledged without being stored twice.
    pub async fn save_incoming_block(&self, block: Block) -> Result<bool, ChainError> {
        let _guard = self.lock_documents().await;
        let mut chain = self.store.load_chain()?;
        let mut registry = self.store.load_registry()?;
        let keys = KeyRing::build(&registry, &self.identity);

        if let Err(e) = blockchain::check_block(&block, &keys) {
            warn!(block = block.block_number, error = %e, "Rejected incoming block");
            return Ok(false);
        }
        if chain.iter().any(|b| b.integrity_stamp == block.integrity_stamp) {
            debug!(block = block.block_number, "Incoming block already stored");
            return Ok(true);
        }

        let joined = match &block.transaction {
            Transaction::Membership(tx) => {
                let entry = match membership_entry(tx, &keys) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(block = block.block_number, error = %e, "Membership block carries an unreadable address");
                        return Ok(false);
                    }
                };
                if self.identity.owns(&entry) {
                    None
                } else {
                    registry.upsert(entry.clone());
                    Some(entry)
                }
            }
            Transaction::AccessKey(_) => None,
        };

        chain.push(block.clone());
        self.store.store_chain(&chain)?;
        if let Some(entry) = joined {
            self.store.store_registry(&registry)?;
            info!(peer = %entry.address, "Registered peer from membership block");
        }
        self.set_state(NodeState::Active);

        info!(block = block.block_number, kind = block.transaction.kind(), "Incoming block saved");
        Ok(true)
    }

    pub fn lookup_by_access_key(&self, access_key: &str) -> Result<Option<Block>, ChainError> {
        let chain = self.store.load_chain()?;
        let keys = self.key_ring()?;
        Ok(blockchain::find_by_access_key(&chain, &keys, access_key).cloned())
    }

    pub fn lookup_by_door_id(&self, door_id: &str) -> Result<Option<Block>, ChainError> {
        let chain = self.store.load_chain()?;
        let keys = self.key_ring()?;
        Ok(blockchain::find_by_door_id(&chain, &keys, door_id).cloned())
    }

    pub fn verify_access_key_locally(&self, door_id: &str, access_key: &str) -> Result<Option<u64>, ChainError> {
        let chain = self.store.load_chain()?;
        let keys = self.key_ring()?;
        Ok(blockchain::find_access_grant(&chain, &keys, door_id, access_key))
    }

    /// Majority vote of every reachable peer plus ourselves on whether the
    /// door/key pair is on the chain.
    pub async fn request_reliability_verification(&self, door_id: &str, access_key: &str) -> Result<bool, ChainError> {
        let peers = self.peer_addresses()?;
        let form = AccessForm::new(door_id, access_key);

        let mut tally = ReliabilityTally::default();
        for (peer, answer) in gather_all(&peers, |peer| self.transport.verify_access_key_locally(peer, &form)).await {
            if let Err(e) = &answer {
                debug!(peer = %peer, error = %e, "Peer gave no opinion");
            }
            tally.record(&answer);
        }
        let own = self
            .verify_access_key_locally(door_id, access_key)?
            .map_or(NOT_FOUND, |n| n as i64);
        tally.record(&Ok(own));

        info!(
            success = tally.success,
            fail = tally.fail,
            silent = tally.silent,
            verdict = tally.verdict(),
            "Reliability verification tallied"
        );
        Ok(tally.verdict())
    }

    /// Records a door/key grant and broadcasts the new block.
    pub async fn save_transaction(&self, door_id: &str, access_key: &str) -> Result<Block, ChainError> {
        let tx = build_access_key_transaction(door_id, access_key, &self.identity)?;
        let block = self.create_block(tx.into()).await?;
        let peers = self.peer_addresses()?;
        self.deploy_block(&block, &peers, Broadcast::ValidateBlock);
        Ok(block)
    }
}

/// Registry entry described by a membership transaction; the address is
/// opened with the submitter's transaction key.
fn membership_entry(tx: &MembershipTx, keys: &KeyRing) -> Result<PeerEntry, ChainError> {
    let key = keys
        .get(&tx.submitter_key_fingerprint)
        .ok_or_else(|| ChainError::Crypto("Unknown submitter".to_string()))?;
    let address = crypto::decrypt_string_with_key(key, &tx.encrypted_requester_address)?;
    Ok(PeerEntry::new(
        address,
        tx.requester_network_public_key.clone(),
        tx.requester_transaction_private_key.clone(),
    ))
}
