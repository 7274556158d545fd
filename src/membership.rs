//! Joining and maintaining the peer network.
//!
//! A joiner learns a directory node's network public key, asks it for the
//! current peer list, then asks one listed peer to accept it. The accepting
//! peer records the joiner, stamps a membership block and broadcasts it so
//! every other node learns the joiner's keys too.

use crate::blockchain::Block;
use crate::crypto;
use crate::error::ChainError;
use crate::ledger::Ledger;
use crate::network::{Broadcast, JoinForm, JoinResponse};
use crate::registry::{PeerEntry, Upsert};
use crate::sync::gather_all;
use crate::transaction::build_membership_transaction;
use tracing::{debug, info, warn};

/// How a node came to be part of a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// No peers existed; this node created the genesis block.
    Founded,
    /// Accepted by `via`; `peers` entries were merged into the registry.
    Joined { via: String, peers: usize },
}

impl Ledger {
    /// This node's own registry entry, as served by `network-identity`.
    pub fn network_identity(&self) -> PeerEntry {
        self.identity().self_entry()
    }

    /// Fetches the registry entry a peer publishes for itself.
    pub async fn discover_bootstrap(&self, address: &str) -> Result<PeerEntry, ChainError> {
        let entry = self.transport().network_identity(address).await?;
        debug!(peer = %address, "Learned bootstrap identity");
        Ok(PeerEntry { address: address.to_string(), ..entry })
    }

    fn join_form(&self, target: &PeerEntry, public_addr: Option<String>) -> Result<JoinForm, ChainError> {
        let own = self.identity();
        Ok(JoinForm {
            public_addr,
            private_addr_encrypted: crypto::encrypt_to_base64(&target.network_public_key, own.address.as_bytes())?,
            network_public_key: own.network.public_pem.clone(),
            transaction_private_key: own.transaction.private_pem.clone(),
        })
    }

    /// Opens a join form's address with our network private key.
    fn open_join_form(&self, form: &JoinForm) -> Result<String, ChainError> {
        let network_key = &self.identity().network.private_pem;
        crypto::decrypt_from_base64(network_key, &form.private_addr_encrypted)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(ChainError::DecryptionFault)
    }

    /// Joins through `bootstrap`, or founds a network when there is none.
    /// On acceptance the returned peers are merged into the registry and the
    /// starting chain is pulled from them, the accepting peer first.
    pub async fn request_join(&self, bootstrap: Option<&PeerEntry>) -> Result<JoinOutcome, ChainError> {
        let Some(bootstrap) = bootstrap else {
            info!("No bootstrap peer, founding a new network");
            self.create_genesis_block().await?;
            return Ok(JoinOutcome::Founded);
        };

        let form = self.join_form(bootstrap, None)?;
        let peers = match self.transport().accept_join(&bootstrap.address, &form).await? {
            JoinResponse::Peers(peers) => peers,
            JoinResponse::Fault(marker) => return Err(fault_from_marker(marker)),
        };

        let merged = {
            let _guard = self.lock_documents().await;
            let mut registry = self.store().load_registry()?;
            let merged = registry.merge(peers, self.identity());
            self.store().store_registry(&registry)?;
            merged
        };
        info!(peer = %bootstrap.address, merged, "Join accepted");

        // The accepting peer already holds our membership block; the others
        // may still be receiving it.
        self.consensus_block_via(&bootstrap.address).await?;
        Ok(JoinOutcome::Joined {
            via: bootstrap.address.clone(),
            peers: merged,
        })
    }

    /// Full join through a directory node: ask it for the peer list, then
    /// ask each listed peer in turn to accept us until one does. An empty
    /// list, or no directory at all, founds a new network.
    pub async fn join_network(&self, directory: Option<&str>) -> Result<JoinOutcome, ChainError> {
        let Some(directory) = directory else {
            return self.request_join(None).await;
        };

        let directory_entry = self.discover_bootstrap(directory).await?;
        let form = self.join_form(&directory_entry, Some(self.address().to_string()))?;
        let candidates: Vec<PeerEntry> = match self.transport().request_join(directory, &form).await? {
            JoinResponse::Peers(peers) => peers.into_iter().filter(|p| !self.identity().owns(p)).collect(),
            JoinResponse::Fault(marker) => return Err(fault_from_marker(marker)),
        };

        if candidates.is_empty() {
            return self.request_join(None).await;
        }

        for candidate in &candidates {
            match self.request_join(Some(candidate)).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => warn!(peer = %candidate.address, error = %e, "Join attempt failed, trying next"),
            }
        }
        Err(ChainError::Transport(format!(
            "None of {} listed peers accepted the join",
            candidates.len()
        )))
    }

    /// Directory role: checks that the caller sealed its address to us and
    /// returns every peer we know plus ourselves. Nothing is recorded.
    pub async fn handle_request_join(&self, form: &JoinForm) -> Result<Vec<PeerEntry>, ChainError> {
        let address = self.open_join_form(form).map_err(|e| {
            warn!("Join directory request could not be decrypted");
            e
        })?;
        debug!(peer = %address, "Serving peer directory");
        Ok(self.registry()?.with_self(self.identity()))
    }

    /// Accepts a joiner: records it, stamps and broadcasts its membership
    /// block, and hands back the peer list including ourselves. An address
    /// we cannot decrypt aborts the join with [`ChainError::DecryptionFault`]
    /// before anything is written.
    pub async fn accept_join(&self, form: &JoinForm) -> Result<Vec<PeerEntry>, ChainError> {
        let address = match self.open_join_form(form) {
            Ok(address) => address,
            Err(e) => {
                warn!("Join request could not be decrypted");
                return Err(e);
            }
        };
        let entry = PeerEntry::new(
            address.clone(),
            form.network_public_key.clone(),
            form.transaction_private_key.clone(),
        );
        if self.identity().owns(&entry) {
            return Err(ChainError::InvalidState("Refusing to accept our own keys".to_string()));
        }

        let tx = build_membership_transaction(
            &address,
            &form.network_public_key,
            &form.transaction_private_key,
            self.identity(),
        )?;
        let block = self.create_block(tx.into()).await?;

        let registry = {
            let _guard = self.lock_documents().await;
            let mut registry = self.store().load_registry()?;
            let outcome = registry.upsert(entry);
            self.store().store_registry(&registry)?;
            info!(peer = %address, new = (outcome == Upsert::Inserted), "Peer accepted");
            registry
        };

        let targets: Vec<String> = registry
            .addresses()
            .into_iter()
            .filter(|a| a != &address)
            .collect();
        self.deploy_block(&block, &targets, Broadcast::LocalValidation);

        Ok(registry.with_self(self.identity()))
    }

    /// A membership block relayed by the node that accepted a joiner.
    pub async fn accept_local_validation(&self, block: Block) -> Result<bool, ChainError> {
        self.save_incoming_block(block).await
    }

    /// Refreshes every peer's registry entry from the peer itself.
    /// Unreachable peers are kept as they are. Returns false when peers are
    /// known but none answered.
    pub async fn request_network_integrity(&self) -> Result<bool, ChainError> {
        let peers = self.peer_addresses()?;
        if peers.is_empty() {
            return Ok(true);
        }

        let results = gather_all(&peers, |peer| self.transport().network_identity(peer)).await;

        let _guard = self.lock_documents().await;
        let mut registry = self.store().load_registry()?;
        let mut answered = 0;
        for (peer, result) in results {
            match result {
                Ok(entry) if self.identity().owns(&entry) => {
                    warn!(peer = %peer, "Peer answered with our own keys");
                }
                Ok(entry) => {
                    answered += 1;
                    registry.upsert(entry);
                }
                Err(e) => warn!(peer = %peer, error = %e, "Peer unreachable during network integrity"),
            }
        }
        self.store().store_registry(&registry)?;

        info!(peers = peers.len(), answered, "Network integrity finished");
        Ok(answered > 0)
    }
}

fn fault_from_marker(marker: String) -> ChainError {
    if marker == ChainError::DecryptionFault.to_string() {
        ChainError::DecryptionFault
    } else {
        ChainError::Transport(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::NodeIdentity;
    use crate::network::LoopbackTransport;
    use crate::persistence::InMemoryStore;
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    static NODE: Lazy<NodeIdentity> = Lazy::new(|| NodeIdentity::generate("10.0.0.1").unwrap());
    static JOINER: Lazy<NodeIdentity> = Lazy::new(|| NodeIdentity::generate("10.0.0.2").unwrap());

    fn ledger(identity: &NodeIdentity) -> Ledger {
        let ledger = Ledger::new(identity.clone(), Arc::new(InMemoryStore::new()), LoopbackTransport::new());
        ledger.boot().unwrap();
        ledger
    }

    fn form_for(target: &NodeIdentity, joiner: &NodeIdentity) -> JoinForm {
        JoinForm {
            public_addr: None,
            private_addr_encrypted: crypto::encrypt_to_base64(&target.network.public_pem, joiner.address.as_bytes())
                .unwrap(),
            network_public_key: joiner.network.public_pem.clone(),
            transaction_private_key: joiner.transaction.private_pem.clone(),
        }
    }

    #[tokio::test]
    async fn test_accept_join_records_peer_and_block() {
        let node = ledger(&NODE);
        node.create_genesis_block().await.unwrap();

        let peers = node.accept_join(&form_for(&NODE, &JOINER)).await.unwrap();
        assert_eq!(peers, vec![JOINER.self_entry(), NODE.self_entry()]);

        let chain = node.chain().unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[1].is_membership());
        assert_eq!(node.registry().unwrap().entries(), &[JOINER.self_entry()]);
    }

    #[tokio::test]
    async fn test_accept_join_with_foreign_seal_is_decryption_fault() {
        let node = ledger(&NODE);
        node.create_genesis_block().await.unwrap();

        // Sealed to the joiner's own network key instead of ours.
        let result = node.accept_join(&form_for(&JOINER, &JOINER)).await;
        assert!(matches!(result, Err(ChainError::DecryptionFault)));
        assert_eq!(node.chain().unwrap().len(), 1);
        assert!(node.registry().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directory_lists_self_without_recording() {
        let node = ledger(&NODE);
        let peers = node.handle_request_join(&form_for(&NODE, &JOINER)).await.unwrap();
        assert_eq!(peers, vec![NODE.self_entry()]);
        assert!(node.registry().unwrap().is_empty());

        let err = node.handle_request_join(&form_for(&JOINER, &JOINER)).await.unwrap_err();
        assert_eq!(err.to_string(), "Decryption error");
    }

    #[tokio::test]
    async fn test_request_join_without_bootstrap_founds() {
        let node = ledger(&NODE);
        assert_eq!(node.request_join(None).await.unwrap(), JoinOutcome::Founded);
        assert_eq!(node.chain().unwrap().len(), 1);
        assert_eq!(node.network_identity(), NODE.self_entry());
    }

    #[test]
    fn test_fault_marker_mapping() {
        assert!(matches!(fault_from_marker("Decryption error".to_string()), ChainError::DecryptionFault));
        assert!(fault_from_marker("Server is not working".to_string()).is_transport());
    }
}
