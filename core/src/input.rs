//! Provable input types for Witness-EVM
//!
//! A provable input bundles the block to validate with the minimal witness needed to
//! re-execute it: ancestor headers, contract codes and state-trie nodes.

use crate::block::{Block, Header};
use crate::chain::ChainConfig;
use crate::errors::{Result, WitnessEvmError};
use crate::hashing::keccak256;
use crate::types::{Bytes, Hash};
use alloc::vec::Vec;
use alloy_eips::eip2718::Encodable2718;
use alloy_rlp::Encodable;
use serde::{Deserialize, Serialize};

/// Everything the block's state transition may read
///
/// `codes` and `state` are content-addressed by `keccak256(blob)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Parent header first, then further ancestors
    pub ancestors: Vec<Header>,
    /// Contract bytecodes
    pub codes: Vec<Bytes>,
    /// Raw RLP-encoded trie nodes (account and storage tries)
    pub state: Vec<Bytes>,
}

impl Witness {
    /// The header whose state root execution starts from
    pub fn parent(&self) -> Option<&Header> {
        self.ancestors.first()
    }
}

/// Complete provable input
///
/// Only `blocks[0]` is processed; later blocks are carried but not executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverInput {
    pub chain_config: ChainConfig,
    pub blocks: Vec<Block>,
    pub witness: Witness,
}

impl ProverInput {
    /// Create new provable input
    pub fn new(chain_config: ChainConfig, blocks: Vec<Block>, witness: Witness) -> Self {
        Self {
            chain_config,
            blocks,
            witness,
        }
    }

    /// Reject inputs that cannot be validated at all
    pub fn validate(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(WitnessEvmError::MalformedRequest(
                "input contains no blocks".into(),
            ));
        }
        if self.witness.ancestors.is_empty() {
            return Err(WitnessEvmError::MalformedRequest(
                "witness contains no ancestor headers".into(),
            ));
        }
        Ok(())
    }

    /// The block this input proves
    pub fn block(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Deterministic fingerprint of this input
    ///
    /// Covers the configuration, then the consensus encodings of every block and
    /// witness entry, each sequence prefixed with its length.
    pub fn hash(&self) -> Result<Hash> {
        let mut buf = bincode::serialize(&self.chain_config)?;
        (self.blocks.len() as u64).encode(&mut buf);
        for block in &self.blocks {
            block.header.encode(&mut buf);
            (block.transactions.len() as u64).encode(&mut buf);
            for tx in &block.transactions {
                tx.encode_2718(&mut buf);
            }
            match &block.withdrawals {
                Some(withdrawals) => {
                    buf.push(1);
                    withdrawals.encode(&mut buf);
                }
                None => buf.push(0),
            }
        }
        self.witness.ancestors.encode(&mut buf);
        self.witness.codes.encode(&mut buf);
        self.witness.state.encode(&mut buf);
        Ok(keccak256(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn input(blocks: usize, ancestors: usize) -> ProverInput {
        ProverInput::new(
            ChainConfig::dev(1337),
            vec![Block::default(); blocks],
            Witness {
                ancestors: vec![Header::default(); ancestors],
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_validate_requires_blocks() {
        let err = input(0, 1).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[test]
    fn test_validate_requires_ancestors() {
        let err = input(1, 0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
        assert!(err.to_string().contains("ancestor"));
    }

    #[test]
    fn test_validate_ok() {
        let input = input(2, 1);
        input.validate().unwrap();
        assert!(input.block().is_some());
        assert!(input.witness.parent().is_some());
    }

    #[test]
    fn test_input_hash_deterministic() {
        assert_eq!(input(1, 1).hash().unwrap(), input(1, 1).hash().unwrap());
        assert_ne!(input(1, 1).hash().unwrap(), input(1, 2).hash().unwrap());
        assert_ne!(input(1, 1).hash().unwrap(), input(2, 1).hash().unwrap());

        // Empty withdrawals differ from none
        let mut with_withdrawals = input(1, 1);
        with_withdrawals.blocks[0].withdrawals = Some(vec![]);
        assert_ne!(with_withdrawals.hash().unwrap(), input(1, 1).hash().unwrap());

        let mut other_chain = input(1, 1);
        other_chain.chain_config.chain_id = 1;
        assert_ne!(other_chain.hash().unwrap(), input(1, 1).hash().unwrap());
    }

    #[test]
    fn test_input_hash_covers_transactions() {
        let signer = crate::builder::DevSigner::from_seed(1).unwrap();
        let mut signed = input(1, 1);
        let tx = signer
            .transfer(1337, 0, crate::types::Address::repeat_byte(0x02), crate::types::U256::from(1u64))
            .unwrap();
        signed.blocks[0].transactions.push(tx);
        assert_ne!(signed.hash().unwrap(), input(1, 1).hash().unwrap());
    }
}
