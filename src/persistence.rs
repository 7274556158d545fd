//! Document persistence for AccessChain
//!
//! A node keeps exactly two documents: the chain and the peer registry. Each is
//! read and replaced whole; nothing is patched in place.

use crate::blockchain::Chain;
use crate::error::ChainError;
use crate::registry::PeerRegistry;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CHAIN_FILE: &str = "Blockchain.json";
pub const REGISTRY_FILE: &str = "Network.json";

/// Abstraction for persistence backends. `store_*` must replace the whole
/// document atomically; `load_*` returns an empty document when none exists.
pub trait Persistence: Send + Sync {
    fn load_chain(&self) -> Result<Chain, ChainError>;
    fn store_chain(&self, chain: &Chain) -> Result<(), ChainError>;
    fn load_registry(&self) -> Result<PeerRegistry, ChainError>;
    fn store_registry(&self, registry: &PeerRegistry) -> Result<(), ChainError>;
}

/// Stores both documents as JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    chain_path: PathBuf,
    registry_path: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ChainError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            ChainError::Persistence(format!("Failed to create data directory {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            chain_path: dir.join(CHAIN_FILE),
            registry_path: dir.join(REGISTRY_FILE),
        })
    }

    pub fn chain_path(&self) -> &Path {
        &self.chain_path
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }
}

fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ChainError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| ChainError::Persistence(format!("Failed to read {}: {}", path.display(), e)))?;
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&contents)
        .map_err(|e| ChainError::Persistence(format!("Failed to parse {}: {}", path.display(), e)))
}

fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<(), ChainError> {
    let json = serde_json::to_string(document)
        .map_err(|e| ChainError::Persistence(format!("Failed to serialize {}: {}", path.display(), e)))?;

    // Atomic write using temporary file
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .map_err(|e| ChainError::Persistence(format!("Failed to create temp file: {}", e)))?;
    file.write_all(json.as_bytes())
        .map_err(|e| ChainError::Persistence(format!("Failed to write {}: {}", path.display(), e)))?;
    file.sync_all()
        .map_err(|e| ChainError::Persistence(format!("Failed to sync file: {}", e)))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| ChainError::Persistence(format!("Failed to finalize write: {}", e)))
}

impl Persistence for JsonFileStore {
    fn load_chain(&self) -> Result<Chain, ChainError> {
        read_document(&self.chain_path)
    }

    fn store_chain(&self, chain: &Chain) -> Result<(), ChainError> {
        write_document(&self.chain_path, chain)
    }

    fn load_registry(&self) -> Result<PeerRegistry, ChainError> {
        read_document(&self.registry_path)
    }

    fn store_registry(&self, registry: &PeerRegistry) -> Result<(), ChainError> {
        write_document(&self.registry_path, registry)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    chain: Arc<RwLock<Chain>>,
    registry: Arc<RwLock<PeerRegistry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryStore {
    fn load_chain(&self) -> Result<Chain, ChainError> {
        Ok(self.chain.read().clone())
    }

    fn store_chain(&self, chain: &Chain) -> Result<(), ChainError> {
        *self.chain.write() = chain.clone();
        Ok(())
    }

    fn load_registry(&self) -> Result<PeerRegistry, ChainError> {
        Ok(self.registry.read().clone())
    }

    fn store_registry(&self, registry: &PeerRegistry) -> Result<(), ChainError> {
        *self.registry.write() = registry.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PeerEntry;
    use tempfile::TempDir;

    #[test]
    fn test_missing_documents_load_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("files")).unwrap();
        assert!(store.load_chain().unwrap().is_empty());
        assert!(store.load_registry().unwrap().is_empty());
    }

    #[test]
    fn test_registry_document_replaced_whole() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let first = PeerRegistry::from_entries(vec![PeerEntry::new("a", "n1", "t1"), PeerEntry::new("b", "n2", "t2")]);
        store.store_registry(&first).unwrap();
        let second = PeerRegistry::from_entries(vec![PeerEntry::new("c", "n3", "t3")]);
        store.store_registry(&second).unwrap();

        assert_eq!(store.load_registry().unwrap(), second);
        assert!(!store.registry_path().with_extension("tmp").exists());

        let raw = fs::read_to_string(store.registry_path()).unwrap();
        assert!(raw.starts_with(r#"[{"address":"c""#));
    }

    #[test]
    fn test_corrupt_document_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(store.chain_path(), "{ not json").unwrap();
        assert!(matches!(store.load_chain(), Err(ChainError::Persistence(_))));
    }

    #[test]
    fn test_in_memory_store_shares_state_between_clones() {
        let store = InMemoryStore::new();
        let clone = store.clone();
        let registry = PeerRegistry::from_entries(vec![PeerEntry::new("a", "n", "t")]);
        clone.store_registry(&registry).unwrap();
        assert_eq!(store.load_registry().unwrap(), registry);
        assert!(store.load_chain().unwrap().is_empty());
    }
}
