//! Integrity stamps.
//!
//! A stamp binds a block to its predecessor and its payload:
//! `digest = hex(SHA-256(previous_stamp ++ canonical_json(tx)))`, encrypted
//! with the submitter's own transaction *public* key (OAEP/SHA-256) and
//! base64-encoded. Checking a stamp means decrypting it with the submitter's
//! transaction *private* key, which the network shares, and comparing digests.

use crate::blockchain::block::{now_millis, Block, GENESIS_PREVIOUS_STAMP};
use crate::crypto::{self, KeyPair};
use crate::error::ChainError;
use crate::keys::NodeIdentity;
use crate::registry::PeerRegistry;
use crate::transaction::Transaction;
use rsa::RsaPrivateKey;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Transaction private keys indexed by the fingerprint their owners stamp with.
/// Built once per operation from the registry and the local identity.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: HashMap<String, RsaPrivateKey>,
}

impl KeyRing {
    pub fn build(registry: &PeerRegistry, own: &NodeIdentity) -> Self {
        let mut ring = KeyRing::default();
        for entry in registry.iter() {
            if let Err(e) = ring.insert_pem(&entry.transaction_private_key) {
                warn!(peer = %entry.address, error = %e, "Skipping peer with unusable transaction key");
            }
        }
        if let Err(e) = ring.insert_pem(&own.transaction.private_pem) {
            warn!(error = %e, "Own transaction key is unusable");
        }
        ring
    }

    pub fn insert_pem(&mut self, private_pem: &str) -> Result<String, ChainError> {
        let fingerprint = crypto::fingerprint_of_private_key(private_pem)?;
        let key = crypto::parse_private_key(private_pem)?;
        self.keys.insert(fingerprint.clone(), key);
        Ok(fingerprint)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&RsaPrivateKey> {
        self.keys.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub fn integrity_digest(previous_stamp: &str, transaction: &Transaction) -> Result<String, ChainError> {
    let mut preimage = String::from(previous_stamp);
    preimage.push_str(&transaction.canonical_json()?);
    Ok(crypto::sha256_hex(preimage.as_bytes()))
}

pub fn stamp(previous_stamp: &str, transaction: &Transaction, own: &KeyPair) -> Result<String, ChainError> {
    let digest = integrity_digest(previous_stamp, transaction)?;
    crypto::encrypt_to_base64(&own.public_pem, digest.as_bytes())
}

/// Builds and stamps a block at `block_number` on top of `previous`, or as a
/// genesis block when there is none. The timestamp never falls behind the
/// previous block's, even when that block came from a peer whose clock runs ahead.
pub fn seal_block(
    block_number: u64,
    previous: Option<&Block>,
    transaction: Transaction,
    own: &NodeIdentity,
) -> Result<Block, ChainError> {
    let (previous_stamp, not_before) = match previous {
        Some(block) => (block.integrity_stamp.as_str(), block.timestamp),
        None => (GENESIS_PREVIOUS_STAMP, i64::MIN),
    };
    let integrity_stamp = stamp(previous_stamp, &transaction, &own.transaction)?;
    Ok(Block {
        block_number,
        timestamp: now_millis().max(not_before),
        submitter_key_fingerprint: own.fingerprint(),
        integrity_stamp,
        previous_integrity_stamp: previous_stamp.to_string(),
        transaction,
    })
}

/// Checks one block's stamp against the submitter's key. Fails with
/// `ChainIntegrity` when the key is unknown or the digest differs and with
/// `Crypto` when the stamp cannot be decrypted.
pub fn check_block(block: &Block, keys: &KeyRing) -> Result<(), ChainError> {
    let key = keys.get(&block.submitter_key_fingerprint).ok_or_else(|| {
        ChainError::ChainIntegrity(format!(
            "No key for submitter of block {}",
            block.block_number
        ))
    })?;
    let decrypted = crypto::decrypt_string_with_key(key, &block.integrity_stamp)?;
    let expected = integrity_digest(&block.previous_integrity_stamp, &block.transaction)?;
    if decrypted != expected {
        return Err(ChainError::ChainIntegrity(format!(
            "Stamp mismatch on block {}",
            block.block_number
        )));
    }
    Ok(())
}

pub fn verify(block: &Block, keys: &KeyRing) -> bool {
    match check_block(block, keys) {
        Ok(()) => true,
        Err(e) => {
            debug!(block = block.block_number, error = %e, "Block verification failed");
            false
        }
    }
}

/// Walks the chain, stopping at the first violation.
pub fn check_chain(chain: &[Block], keys: &KeyRing) -> Result<(), ChainError> {
    for (i, block) in chain.iter().enumerate() {
        if block.block_number != i as u64 {
            return Err(ChainError::ChainIntegrity(format!(
                "Block at position {} claims number {}",
                i, block.block_number
            )));
        }
        if i > 0 {
            let prev = &chain[i - 1];
            if block.previous_integrity_stamp != prev.integrity_stamp {
                return Err(ChainError::ChainIntegrity(format!("Broken link at block {}", i)));
            }
            if prev.timestamp > block.timestamp {
                return Err(ChainError::ChainIntegrity(format!("Timestamp goes backwards at block {}", i)));
            }
        }
        check_block(block, keys)?;
    }
    Ok(())
}

pub fn verify_chain(chain: &[Block], keys: &KeyRing) -> bool {
    match check_chain(chain, keys) {
        Ok(()) => true,
        Err(e) => {
            debug!(length = chain.len(), error = %e, "Chain verification failed");
            false
        }
    }
}
