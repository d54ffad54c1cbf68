//! Redis Cluster slot calculation.
//!
//! A key maps to `CRC16(key) mod 16384`, hashing only the hash tag when the
//! key carries one.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hash slots in Redis Cluster.
pub const SLOT_COUNT: u16 = 16384;

/// CRC-16/XMODEM, the variant Redis Cluster uses.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the Redis Cluster slot for a given key.
///
/// ```
/// use alauda_redis_client::key_slot;
///
/// assert_eq!(key_slot("somekey"), 11058);
/// assert_eq!(key_slot("{user1000}.following"), key_slot("{user1000}.followers"));
/// ```
pub fn key_slot(key: &str) -> u16 {
    let hash_key = extract_hash_tag(key.as_bytes());
    CRC16.checksum(hash_key) % SLOT_COUNT
}

/// Extracts the hash tag: the bytes between the first `{` and the first
/// `}` after it, when non-empty. Otherwise the whole key is hashed.
fn extract_hash_tag(key: &[u8]) -> &[u8] {
    if let Some(start) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[start + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[start + 1..start + 1 + len];
            }
        }
    }
    key
}
