use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// `previousIntegrityStamp` of every genesis block: 256 zero characters.
pub const GENESIS_PREVIOUS_STAMP: &str = concat!(
    "0000000000000000000000000000000000000000000000000000000000000000",
    "0000000000000000000000000000000000000000000000000000000000000000",
    "0000000000000000000000000000000000000000000000000000000000000000",
    "0000000000000000000000000000000000000000000000000000000000000000"
);

/// The ledger: blocks in order, `chain[i].block_number == i`.
pub type Chain = Vec<Block>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "blockNumber", deserialize_with = "lenient_number")]
    pub block_number: u64,
    /// Milliseconds since the Unix epoch.
    #[serde(deserialize_with = "lenient_number")]
    pub timestamp: i64,
    #[serde(rename = "submitterKeyFingerprint")]
    pub submitter_key_fingerprint: String,
    #[serde(rename = "integrityStamp")]
    pub integrity_stamp: String,
    #[serde(rename = "previousIntegrityStamp")]
    pub previous_integrity_stamp: String,
    pub transaction: Transaction,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.block_number == 0 && self.previous_integrity_stamp == GENESIS_PREVIOUS_STAMP
    }

    pub fn is_membership(&self) -> bool {
        self.transaction.as_membership().is_some()
    }

    pub fn to_json(&self) -> Result<String, ChainError> {
        serde_json::to_string(self).map_err(ChainError::from)
    }
}

/// Current time in epoch milliseconds, the unit stored in `Block::timestamp`.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Accepts a JSON number or a numeric string. Peers that relay blocks through
/// form-encoded channels hand the numeric fields back as text.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        other => return Err(de::Error::custom(format!("expected a number, found {}", other))),
    };
    text.parse::<T>().map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_json(number: &str, timestamp: &str) -> String {
        format!(
            r#"{{"blockNumber":{},"timestamp":{},"submitterKeyFingerprint":"fp","integrityStamp":"s1","previousIntegrityStamp":"s0","transaction":{{"encryptedDoorId":"d","encryptedAccessKey":"k","submitterKeyFingerprint":"fp"}}}}"#,
            number, timestamp
        )
    }

    #[test]
    fn test_genesis_sentinel() {
        assert_eq!(GENESIS_PREVIOUS_STAMP.len(), 256);
        assert!(GENESIS_PREVIOUS_STAMP.chars().all(|c| c == '0'));
    }

    #[test]
    fn test_numeric_fields_accept_strings() {
        let from_numbers: Block = serde_json::from_str(&block_json("3", "1700000000000")).unwrap();
        let from_strings: Block = serde_json::from_str(&block_json("\"3\"", "\"1700000000000\"")).unwrap();
        assert_eq!(from_numbers, from_strings);
        assert_eq!(from_strings.block_number, 3);
        assert_eq!(from_strings.timestamp, 1_700_000_000_000);
        assert!(!from_strings.is_membership());
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert!(serde_json::from_str::<Block>(&block_json("\"three\"", "1")).is_err());
        assert!(serde_json::from_str::<Block>(&block_json("-1", "1")).is_err());
        assert!(serde_json::from_str::<Block>(&block_json("true", "1")).is_err());
    }

    #[test]
    fn test_serializes_numbers_as_numbers() {
        let block: Block = serde_json::from_str(&block_json("\"7\"", "\"12\"")).unwrap();
        let json = block.to_json().unwrap();
        assert!(json.starts_with(r#"{"blockNumber":7,"timestamp":12,"#));
    }
}
