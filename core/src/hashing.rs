//! Hashing utilities for Witness-EVM
//!
//! Keccak256 is used for content addressing of witness blobs, trie keys and header hashes.
//! All hashing functions are deterministic for ZK proof compatibility.

use crate::errors::Result;
use crate::types::{Hash, B256};
use sha3::{Digest, Keccak256};

/// Compute Keccak256 hash of arbitrary data
///
/// # Arguments
/// * `data` - Byte slice to hash
///
/// # Returns
/// 32-byte Keccak256 hash
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    B256::from_slice(&hasher.finalize())
}

/// Hash a serializable struct
///
/// Uses bincode for deterministic serialization before hashing, so two values with
/// identical contents always produce the same fingerprint.
pub fn hash_struct<T: serde::Serialize>(value: &T) -> Result<Hash> {
    let bytes = bincode::serialize(value)?;
    Ok(keccak256(&bytes))
}
