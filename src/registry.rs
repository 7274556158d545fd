//! Peer registry: the node's record of every other node's address and keys.
//!
//! Each entry carries the peer's network public key (used to seal join
//! requests to it) and the peer's transaction *private* key, which the network
//! shares so any node can open that peer's encrypted fields and check its
//! integrity stamps. The registry never holds an entry for the local node.

use crate::crypto;
use crate::error::ChainError;
use crate::keys::NodeIdentity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub address: String,
    #[serde(rename = "networkPublicKeyPEM")]
    pub network_public_key: String,
    #[serde(rename = "transactionPrivateKeyPEM")]
    pub transaction_private_key: String,
}

impl PeerEntry {
    pub fn new(
        address: impl Into<String>,
        network_public_key: impl Into<String>,
        transaction_private_key: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            network_public_key: network_public_key.into(),
            transaction_private_key: transaction_private_key.into(),
        }
    }

    /// Two entries describe the same node when either key matches.
    pub fn same_node(&self, other: &PeerEntry) -> bool {
        self.network_public_key == other.network_public_key
            || self.transaction_private_key == other.transaction_private_key
    }

    /// Fingerprint this peer stamps its blocks with.
    pub fn fingerprint(&self) -> Result<String, ChainError> {
        crypto::fingerprint_of_private_key(&self.transaction_private_key)
    }
}

/// Result of [`PeerRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Ordered list of peers. Order matters: chain bootstrap walks peers in
/// registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerRegistry {
    entries: Vec<PeerEntry>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PeerEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PeerEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.address.clone()).collect()
    }

    /// Replaces the first entry sharing a key with `entry`, otherwise appends.
    pub fn upsert(&mut self, entry: PeerEntry) -> Upsert {
        match self.entries.iter_mut().find(|existing| existing.same_node(&entry)) {
            Some(existing) => {
                *existing = entry;
                Upsert::Replaced
            }
            None => {
                self.entries.push(entry);
                Upsert::Inserted
            }
        }
    }

    /// Folds a peer list received from the network into the registry,
    /// dropping any entry that carries one of our own keys. Returns how many
    /// entries were taken.
    pub fn merge(&mut self, incoming: Vec<PeerEntry>, own: &NodeIdentity) -> usize {
        let mut taken = 0;
        for entry in incoming {
            if own.owns(&entry) {
                continue;
            }
            self.upsert(entry);
            taken += 1;
        }
        taken
    }

    /// The full peer list as handed to a joiner: every known peer, then self.
    pub fn with_self(&self, own: &NodeIdentity) -> Vec<PeerEntry> {
        let mut list = self.entries.clone();
        list.push(own.self_entry());
        list
    }
}
