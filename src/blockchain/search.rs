use crate::blockchain::block::Block;
use crate::blockchain::integrity::KeyRing;
use crate::crypto;
use crate::transaction::AccessKeyTx;
use rsa::RsaPrivateKey;

/// Wire value standing in for a block number or block when nothing matched.
pub const NOT_FOUND: i64 = -1;

/// First access-key block, from the front of the chain, for which `matches`
/// holds. Blocks whose submitter is not in the key ring are skipped, and any
/// decryption failure counts as a non-match.
fn scan<'a, F>(chain: &'a [Block], keys: &KeyRing, mut matches: F) -> Option<&'a Block>
where
    F: FnMut(&RsaPrivateKey, &AccessKeyTx) -> bool,
{
    chain.iter().find(|block| {
        let Some(tx) = block.transaction.as_access_key() else {
            return false;
        };
        match keys.get(&block.submitter_key_fingerprint) {
            Some(key) => matches(key, tx),
            None => false,
        }
    })
}

fn field_equals(key: &RsaPrivateKey, ciphertext: &str, expected: &str) -> bool {
    crypto::decrypt_string_with_key(key, ciphertext)
        .map(|plain| plain == expected)
        .unwrap_or(false)
}

pub fn find_by_access_key<'a>(chain: &'a [Block], keys: &KeyRing, access_key: &str) -> Option<&'a Block> {
    scan(chain, keys, |key, tx| field_equals(key, &tx.encrypted_access_key, access_key))
}

pub fn find_by_door_id<'a>(chain: &'a [Block], keys: &KeyRing, door_id: &str) -> Option<&'a Block> {
    scan(chain, keys, |key, tx| field_equals(key, &tx.encrypted_door_id, door_id))
}

/// Block number of the first block granting `access_key` on `door_id`.
pub fn find_access_grant(chain: &[Block], keys: &KeyRing, door_id: &str, access_key: &str) -> Option<u64> {
    scan(chain, keys, |key, tx| {
        field_equals(key, &tx.encrypted_door_id, door_id)
            && field_equals(key, &tx.encrypted_access_key, access_key)
    })
    .map(|block| block.block_number)
}
