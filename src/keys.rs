//! Node key material: the node's own address and its two keypairs.
//!
//! The network keypair protects join requests (a joiner encrypts its address
//! with the target's network public key). The transaction keypair encrypts
//! ledger fields and produces integrity stamps; its private half is published
//! to the rest of the network so every peer can read and verify our blocks.

use crate::crypto::{self, KeyPair};
use crate::error::ChainError;
use crate::registry::PeerEntry;
use std::fs;
use std::path::Path;
use tracing::info;

const NETWORK_KEY_DIR: &str = "network";
const TRANSACTION_KEY_DIR: &str = "transaction";
const PUBLIC_KEY_FILE: &str = "public.pem";
const PRIVATE_KEY_FILE: &str = "private.pem";

/// Which of the node's two keypairs to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Network,
    Transaction,
}

impl KeyKind {
    fn dir_name(self) -> &'static str {
        match self {
            KeyKind::Network => NETWORK_KEY_DIR,
            KeyKind::Transaction => TRANSACTION_KEY_DIR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub address: String,
    pub network: KeyPair,
    pub transaction: KeyPair,
}

impl NodeIdentity {
    pub fn new(address: impl Into<String>, network: KeyPair, transaction: KeyPair) -> Self {
        Self {
            address: address.into(),
            network,
            transaction,
        }
    }

    /// Generates fresh keypairs for `address` without touching the filesystem.
    pub fn generate(address: impl Into<String>) -> Result<Self, ChainError> {
        Ok(Self::new(address, KeyPair::generate()?, KeyPair::generate()?))
    }

    /// Loads both keypairs from `keys_dir`, generating and persisting any that are missing.
    pub fn load_or_generate(address: impl Into<String>, keys_dir: &Path) -> Result<Self, ChainError> {
        let network = load_or_generate_pair(keys_dir, KeyKind::Network)?;
        let transaction = load_or_generate_pair(keys_dir, KeyKind::Transaction)?;
        Ok(Self::new(address, network, transaction))
    }

    /// Fingerprint stamped on every block and transaction this node submits.
    pub fn fingerprint(&self) -> String {
        self.transaction.fingerprint()
    }

    /// The registry entry other nodes keep for us.
    pub fn self_entry(&self) -> PeerEntry {
        PeerEntry {
            address: self.address.clone(),
            network_public_key: self.network.public_pem.clone(),
            transaction_private_key: self.transaction.private_pem.clone(),
        }
    }

    /// True when `entry` carries either of our keys.
    pub fn owns(&self, entry: &PeerEntry) -> bool {
        entry.network_public_key == self.network.public_pem
            || entry.transaction_private_key == self.transaction.private_pem
    }
}

fn load_or_generate_pair(keys_dir: &Path, kind: KeyKind) -> Result<KeyPair, ChainError> {
    let dir = keys_dir.join(kind.dir_name());
    let public_path = dir.join(PUBLIC_KEY_FILE);
    let private_path = dir.join(PRIVATE_KEY_FILE);

    if public_path.exists() && private_path.exists() {
        let public_pem = fs::read_to_string(&public_path)?;
        let private_pem = fs::read_to_string(&private_path)?;
        info!(kind = ?kind, dir = %dir.display(), "Key files already exist");
        return KeyPair::from_pems(public_pem, private_pem);
    }

    fs::create_dir_all(&dir)?;
    let pair = KeyPair::generate()?;
    fs::write(&public_path, &pair.public_pem)?;
    fs::write(&private_path, &pair.private_pem)?;
    info!(kind = ?kind, dir = %dir.display(), "Generated key files");

    // Sanity check that what we wrote is what a later boot will read.
    let fingerprint = crypto::pem_fingerprint(&fs::read_to_string(&public_path)?);
    if fingerprint != pair.fingerprint() {
        return Err(ChainError::Crypto(format!(
            "Key file {} did not round-trip",
            public_path.display()
        )));
    }

    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_or_generate_is_stable() {
        let dir = TempDir::new().unwrap();

        let first = NodeIdentity::load_or_generate("10.0.0.1", dir.path()).unwrap();
        assert!(dir.path().join("network/public.pem").exists());
        assert!(dir.path().join("transaction/private.pem").exists());

        let second = NodeIdentity::load_or_generate("10.0.0.1", dir.path()).unwrap();
        assert_eq!(first, second);
        assert_ne!(first.network, first.transaction);
    }

    #[test]
    fn test_self_entry_and_ownership() {
        let dir = TempDir::new().unwrap();
        let identity = NodeIdentity::load_or_generate("10.0.0.9", dir.path()).unwrap();

        let entry = identity.self_entry();
        assert_eq!(entry.address, "10.0.0.9");
        assert_eq!(entry.transaction_private_key, identity.transaction.private_pem);
        assert!(identity.owns(&entry));

        let stranger = PeerEntry {
            address: "10.0.0.9".to_string(),
            network_public_key: "other".to_string(),
            transaction_private_key: "other".to_string(),
        };
        assert!(!identity.owns(&stranger));
    }
}
