//! Transaction module split into types and builders

pub mod builder;
pub mod types;

pub use builder::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use crate::keys::NodeIdentity;
    use once_cell::sync::Lazy;

    static NODE: Lazy<NodeIdentity> = Lazy::new(|| NodeIdentity::generate("10.0.0.1").unwrap());
    static PEER: Lazy<NodeIdentity> = Lazy::new(|| NodeIdentity::generate("10.0.0.2").unwrap());

    #[test]
    fn test_access_key_transaction_fields_are_sealed() {
        let tx = build_access_key_transaction("door-1", "key-1", &NODE).unwrap();

        assert_eq!(tx.submitter_key_fingerprint, NODE.fingerprint());
        assert_ne!(tx.encrypted_door_id, "door-1");

        let door = crypto::decrypt_from_base64(&NODE.transaction.private_pem, &tx.encrypted_door_id).unwrap();
        let key = crypto::decrypt_from_base64(&NODE.transaction.private_pem, &tx.encrypted_access_key).unwrap();
        assert_eq!(door, b"door-1");
        assert_eq!(key, b"key-1");
    }

    #[test]
    fn test_membership_transaction_copies_peer_keys() {
        let tx = build_membership_transaction(
            &PEER.address,
            &PEER.network.public_pem,
            &PEER.transaction.private_pem,
            &NODE,
        )
        .unwrap();

        assert_eq!(tx.requester_network_public_key, PEER.network.public_pem);
        assert_eq!(tx.requester_transaction_private_key, PEER.transaction.private_pem);
        assert_eq!(tx.submitter_key_fingerprint, NODE.fingerprint());

        // Only the submitter's transaction key opens the address.
        let address = crypto::decrypt_from_base64(&NODE.transaction.private_pem, &tx.encrypted_requester_address).unwrap();
        assert_eq!(address, PEER.address.as_bytes());
        assert!(crypto::decrypt_from_base64(&PEER.transaction.private_pem, &tx.encrypted_requester_address).is_err());
    }

    #[test]
    fn test_untagged_variants_are_recognised() {
        let access: Transaction = build_access_key_transaction("d", "k", &NODE).unwrap().into();
        let json = access.canonical_json().unwrap();
        assert!(json.starts_with("{\"encryptedDoorId\":"));
        let parsed: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind(), "access-key");
        assert_eq!(parsed.canonical_json().unwrap(), json);

        let membership: Transaction = build_membership_transaction("a", "n", "t", &NODE).unwrap().into();
        let json = membership.canonical_json().unwrap();
        let parsed: Transaction = serde_json::from_str(&json).unwrap();
        assert!(parsed.as_membership().is_some());
        assert_eq!(parsed.submitter_fingerprint(), NODE.fingerprint());
    }
}
