//! Builds transactions on behalf of the local node.
//!
//! Both builders are pure apart from reading the node's own keys: every
//! encrypted field is sealed with the local transaction public key, and the
//! local fingerprint is recorded as submitter.

use crate::crypto;
use crate::error::ChainError;
use crate::keys::NodeIdentity;
use crate::transaction::types::{AccessKeyTx, MembershipTx};

/// Membership record for `peer_address`. The peer's network public key and
/// transaction private key are copied verbatim so the network can later
/// verify and decrypt on the peer's behalf.
pub fn build_membership_transaction(
    peer_address: &str,
    peer_network_public_key: &str,
    peer_transaction_private_key: &str,
    own: &NodeIdentity,
) -> Result<MembershipTx, ChainError> {
    let encrypted_requester_address =
        crypto::encrypt_to_base64(&own.transaction.public_pem, peer_address.as_bytes())?;

    Ok(MembershipTx {
        encrypted_requester_address,
        requester_network_public_key: peer_network_public_key.to_string(),
        requester_transaction_private_key: peer_transaction_private_key.to_string(),
        submitter_key_fingerprint: own.fingerprint(),
    })
}

pub fn build_access_key_transaction(
    door_id: &str,
    access_key: &str,
    own: &NodeIdentity,
) -> Result<AccessKeyTx, ChainError> {
    let public_pem = &own.transaction.public_pem;
    Ok(AccessKeyTx {
        encrypted_door_id: crypto::encrypt_to_base64(public_pem, door_id.as_bytes())?,
        encrypted_access_key: crypto::encrypt_to_base64(public_pem, access_key.as_bytes())?,
        submitter_key_fingerprint: own.fingerprint(),
    })
}
