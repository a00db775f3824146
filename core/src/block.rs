//! Block types for Witness-EVM
//!
//! Blocks pair an `alloy-consensus` header with a body of signed EIP-2718 transactions and
//! EIP-4895 withdrawals. Senders are not part of the block; they are recovered from the
//! signatures during execution.

pub use alloy_consensus::{Header, TxEnvelope, EMPTY_OMMER_ROOT_HASH};
pub use alloy_eips::eip4895::Withdrawal;

use crate::mpt::ordered_trie_root;
use crate::types::{BlockNumber, Gas, Hash};
use alloc::vec::Vec;
use alloy_consensus::Transaction as _;
use alloy_eips::eip2718::Encodable2718;
use alloy_eips::eip4844::DATA_GAS_PER_BLOB;
use alloy_rlp::Encodable;
use serde::{Deserialize, Serialize};

/// Blob gas `tx` consumes; only EIP-4844 transactions carry blobs
pub fn blob_gas(tx: &TxEnvelope) -> Gas {
    tx.blob_versioned_hashes()
        .map_or(0, |hashes| DATA_GAS_PER_BLOB * hashes.len() as Gas)
}

/// A block: header plus body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<TxEnvelope>,
    /// Present from Shanghai on
    #[serde(default)]
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl Block {
    /// Block hash
    pub fn hash(&self) -> Hash {
        self.header.hash_slow()
    }

    /// Block number
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// Root of the canonical EIP-2718 transaction encodings
    pub fn transactions_root(&self) -> Hash {
        ordered_trie_root(&self.transactions, |tx, buf| tx.encode_2718(buf))
    }

    /// Root of the withdrawals, if the body has them
    pub fn withdrawals_root(&self) -> Option<Hash> {
        self.withdrawals
            .as_ref()
            .map(|withdrawals| ordered_trie_root(withdrawals, |w, buf| w.encode(buf)))
    }
}
