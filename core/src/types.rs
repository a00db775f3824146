//! Core type definitions for Witness-EVM
//!
//! Uses alloy-primitives for Ethereum-compatible types.
//! These types are designed to be ZK-VM friendly (no_std compatible).

pub use alloy_eips::eip4895::GWEI_TO_WEI;
pub use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};

/// 32-byte hash (Keccak256 output)
pub type Hash = B256;

/// Gas amount type
pub type Gas = u64;

/// Block number
pub type BlockNumber = u64;

/// Timestamp (seconds since epoch)
pub type Timestamp = u64;
