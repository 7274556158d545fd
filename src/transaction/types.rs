/// Transaction types for AccessChain
use crate::error::ChainError;
use serde::{Deserialize, Serialize};

/// A ledger entry payload. Serialized untagged: the variant is recognised by
/// its field set, which keeps the canonical JSON identical to what the
/// submitter stamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transaction {
    Membership(MembershipTx),
    AccessKey(AccessKeyTx),
}

impl Transaction {
    /// Fingerprint of the node that built this transaction.
    pub fn submitter_fingerprint(&self) -> &str {
        match self {
            Transaction::Membership(tx) => &tx.submitter_key_fingerprint,
            Transaction::AccessKey(tx) => &tx.submitter_key_fingerprint,
        }
    }

    /// Compact JSON in field-declaration order; input to the integrity digest.
    pub fn canonical_json(&self) -> Result<String, ChainError> {
        serde_json::to_string(self).map_err(ChainError::from)
    }

    pub fn as_access_key(&self) -> Option<&AccessKeyTx> {
        match self {
            Transaction::AccessKey(tx) => Some(tx),
            Transaction::Membership(_) => None,
        }
    }

    pub fn as_membership(&self) -> Option<&MembershipTx> {
        match self {
            Transaction::Membership(tx) => Some(tx),
            Transaction::AccessKey(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::Membership(_) => "membership",
            Transaction::AccessKey(_) => "access-key",
        }
    }
}

/// Records a node joining the network.
///
/// The requester's transaction *private* key is carried in the clear so that
/// every peer can later decrypt the requester's fields and check its stamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MembershipTx {
    /// Requester address, encrypted with the submitter's transaction public key.
    #[serde(rename = "encryptedRequesterAddress")]
    pub encrypted_requester_address: String,
    #[serde(rename = "requesterNetworkPublicKeyPEM")]
    pub requester_network_public_key: String,
    #[serde(rename = "requesterTransactionPrivateKeyPEM")]
    pub requester_transaction_private_key: String,
    #[serde(rename = "submitterKeyFingerprint")]
    pub submitter_key_fingerprint: String,
}

/// Records an authorized door/key pair. Both fields are encrypted with the
/// submitter's transaction public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessKeyTx {
    #[serde(rename = "encryptedDoorId")]
    pub encrypted_door_id: String,
    #[serde(rename = "encryptedAccessKey")]
    pub encrypted_access_key: String,
    #[serde(rename = "submitterKeyFingerprint")]
    pub submitter_key_fingerprint: String,
}

impl From<MembershipTx> for Transaction {
    fn from(tx: MembershipTx) -> Self {
        Transaction::Membership(tx)
    }
}

impl From<AccessKeyTx> for Transaction {
    fn from(tx: AccessKeyTx) -> Self {
        Transaction::AccessKey(tx)
    }
}
