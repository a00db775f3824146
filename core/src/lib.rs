//! # Witness-EVM Core
//!
//! Stateless execution validator for provable block inputs.
//!
//! A provable input is a block plus the minimal witness of everything its state
//! transition reads: ancestor headers, contract codes and Merkle-Patricia trie nodes.
//! This crate re-executes the block against that witness alone and checks the result
//! against the block header. It is designed to be:
//! - **Stateless**: no access to anything outside the input
//! - **Deterministic**: same input always produces same result
//! - **Precise about failure**: an incomplete witness is reported as such, never as a
//!   wrong state root
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ProverInput   │ ── Block, ancestors, codes, trie nodes
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  WitnessStore   │ ── Content-addressed blobs
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  ChainContext   │ ── Fork rules, ancestor lookups
//! │  PreStateView   │ ── Partial trie at the parent's state root
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  Driver chain   │ ── tags → logging → revm engine
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ ExecutionResult │ ── Receipts, roots, bloom
//! └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use witness_evm_core::prelude::*;
//!
//! let signer = DevSigner::from_seed(1)?;
//! let input = ProverInputBuilder::new()
//!     .with_account(signer.address(), AccountState::new_with_balance(balance))
//!     .with_transaction(signer.transfer(DEV_CHAIN_ID, 0, receiver, amount)?)
//!     .build()?;
//!
//! let result = ProvableExecutor::new().execute(&input)?;
//! assert_eq!(result.state_root, input.blocks[0].header.state_root);
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Core type definitions (Address, Hash, U256)
//! - [`errors`] - Error taxonomy and Result alias
//! - [`hashing`] - Keccak256 and struct fingerprints
//! - [`block`] - Blocks over alloy headers, signed transactions and withdrawals
//! - [`mpt`] - Partial Merkle-Patricia tries over kona-mpt
//! - [`input`] - Provable input and witness
//! - [`store`] - Witness store
//! - [`chain`] - Chain configuration and context
//! - [`state`] - Witness-backed pre-state view
//! - [`output`] - Receipts and execution result
//! - [`evm`] - revm block engine
//! - [`context`] - Correlation tags
//! - [`driver`] - Middleware chain around the engine
//! - [`executor`] - Validation entry point
//! - [`builder`] - Sample input builder and dev signer

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod block;
#[cfg(feature = "std")]
pub mod builder;
pub mod chain;
pub mod context;
pub mod driver;
pub mod errors;
pub mod evm;
pub mod executor;
pub mod hashing;
pub mod input;
pub mod mpt;
pub mod output;
pub mod state;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use block::{blob_gas, Block, Header, TxEnvelope, Withdrawal};
#[cfg(feature = "std")]
pub use builder::{DevSigner, ProverInputBuilder, DEV_CHAIN_ID};
pub use chain::{ChainConfig, ChainContext};
pub use context::RequestContext;
pub use driver::{BlockExecutor, EvmExecutor, Middleware};
pub use errors::{ErrorKind, Mismatch, Result, Stage, WitnessEntry, WitnessEvmError};
pub use evm::ExecParams;
pub use executor::ProvableExecutor;
pub use hashing::{hash_struct, keccak256};
pub use input::{ProverInput, Witness};
pub use output::{ExecutionResult, Log, Receipt};
pub use state::{AccountState, PreStateView};
pub use store::WitnessStore;
pub use types::{Address, Bytes, Gas, Hash, U256};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AccountState, Address, Block, Bytes, ChainConfig, ErrorKind, ExecutionResult, Gas, Hash,
        Header, Log, ProvableExecutor, ProverInput, Receipt, Result, TxEnvelope, Witness,
        WitnessEvmError, Withdrawal, U256,
    };
    #[cfg(feature = "std")]
    pub use crate::{DevSigner, ProverInputBuilder, DEV_CHAIN_ID};
}

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use crate::builder::state_trie;
    use crate::evm::BEACON_ROOTS_ADDRESS;
    use crate::{keccak256, WitnessEntry};
    use std::collections::BTreeMap;

    const ETH: u64 = 1_000_000_000_000_000_000;
    const GWEI: u64 = 1_000_000_000;

    fn signer() -> DevSigner {
        DevSigner::from_seed(1).unwrap()
    }

    fn sender() -> Address {
        signer().address()
    }

    fn call(to: Address, gas_limit: u64) -> TxEnvelope {
        signer().call(DEV_CHAIN_ID, 0, to, Bytes::new(), gas_limit).unwrap()
    }

    fn receiver() -> Address {
        Address::repeat_byte(0x02)
    }

    fn coinbase() -> Address {
        Address::repeat_byte(0xcb)
    }

    fn transfer_input(value: u64) -> ProverInput {
        ProverInputBuilder::new()
            .with_account(sender(), AccountState::new_with_balance(U256::from(ETH)))
            .with_account(receiver(), AccountState::new_with_balance(U256::from(ETH)))
            .with_account(coinbase(), AccountState::new_with_balance(U256::from(1u64)))
            .with_beneficiary(coinbase())
            .with_transaction(
                signer()
                    .transfer(DEV_CHAIN_ID, 0, receiver(), U256::from(value))
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    /// Valid input validates, and the root matches an independently built trie
    #[test]
    fn test_transfer_validates() {
        let input = transfer_input(1000);
        let result = ProvableExecutor::new().execute(&input).unwrap();

        let mut sender_after =
            AccountState::new_with_balance(U256::from(ETH - 21_000 * GWEI - 1000));
        sender_after.nonce = 1;
        let mut expected = BTreeMap::new();
        expected.insert(sender(), sender_after);
        expected.insert(
            receiver(),
            AccountState::new_with_balance(U256::from(ETH + 1000)),
        );
        // Legacy gas price equals the base fee, so no tip
        expected.insert(coinbase(), AccountState::new_with_balance(U256::from(1u64)));
        let (root, _) = state_trie(&expected).unwrap();

        assert_eq!(result.state_root, root);
        assert_eq!(result.state_root, input.blocks[0].header.state_root);
        assert_eq!(result.gas_used, 21_000);
        assert!(result.receipts[0].success);
    }

    /// Every trie node in the witness is needed
    #[test]
    fn test_removing_any_node_is_insufficient_witness() {
        let input = transfer_input(1000);
        assert!(input.witness.state.len() > 1);

        for index in 0..input.witness.state.len() {
            let mut partial = input.clone();
            let removed = partial.witness.state.remove(index);

            let err = ProvableExecutor::new().execute(&partial).unwrap_err();
            assert_eq!(
                err.kind(),
                ErrorKind::InsufficientWitness,
                "node {} gave {err}",
                keccak256(&removed)
            );
        }
    }

    /// chain id 1, witness {ancestors: [parent], codes: {h1}, state: {nodeA, nodeB}}
    #[test]
    fn test_two_node_witness_scenario() {
        let code = vec![0x60, 0x00, 0x35, 0x00];
        let mut storage = BTreeMap::new();
        storage.insert(U256::from(1u64), U256::from(1u64));
        let input = ProverInputBuilder::new()
            .with_chain_config(ChainConfig::dev(1))
            .with_account(
                BEACON_ROOTS_ADDRESS,
                AccountState::new_contract_with_storage(code.clone(), U256::ZERO, storage),
            )
            .build()
            .unwrap();
        assert_eq!(input.witness.ancestors.len(), 1);
        assert_eq!(input.witness.codes, vec![Bytes::from(code)]);
        assert_eq!(input.witness.state.len(), 2);

        let result = ProvableExecutor::new().execute(&input).unwrap();
        assert_eq!(result.state_root, input.blocks[0].header.state_root);
        assert_ne!(result.state_root, input.witness.ancestors[0].state_root);

        // Drop the storage node (nodeB), keep the account node (nodeA)
        let mut partial = input.clone();
        let account_root = partial.witness.ancestors[0].state_root;
        partial
            .witness
            .state
            .retain(|node| keccak256(node) == account_root);
        assert_eq!(partial.witness.state.len(), 1);

        let err = ProvableExecutor::new().execute(&partial).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientWitness);
        assert!(matches!(err.root_cause(), WitnessEvmError::Trie(_)));
        assert!(err.to_string().contains("missing trie node"));
    }

    #[test]
    fn test_missing_code() {
        // PUSH1 1, PUSH1 0, SSTORE, STOP
        let contract = Address::repeat_byte(0xc0);
        let mut input = ProverInputBuilder::new()
            .with_account(sender(), AccountState::new_with_balance(U256::from(ETH)))
            .with_account(
                contract,
                AccountState::new_contract(vec![0x60, 0x01, 0x60, 0x00, 0x55, 0x00], U256::ZERO),
            )
            .with_transaction(call(contract, 100_000))
            .build()
            .unwrap();
        ProvableExecutor::new().execute(&input).unwrap();

        input.witness.codes.clear();
        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            WitnessEvmError::InsufficientWitness {
                entry: WitnessEntry::Code,
                ..
            }
        ));
    }

    #[test]
    fn test_blockhash_needs_ancestor_headers() {
        // PUSH1 97, BLOCKHASH, PUSH1 0, SSTORE, STOP
        let contract = Address::repeat_byte(0xc0);
        let mut input = ProverInputBuilder::new()
            .with_ancestors(3)
            .with_account(sender(), AccountState::new_with_balance(U256::from(ETH)))
            .with_account(
                contract,
                AccountState::new_contract(vec![0x60, 0x61, 0x40, 0x60, 0x00, 0x55, 0x00], U256::ZERO),
            )
            .with_transaction(call(contract, 100_000))
            .build()
            .unwrap();
        let result = ProvableExecutor::new().execute(&input).unwrap();
        assert!(result.receipts[0].success);

        // Block 97's hash is read out of header 98, which is no longer witnessed
        input.witness.ancestors.truncate(1);
        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            WitnessEvmError::InsufficientWitness {
                entry: WitnessEntry::Header,
                ..
            }
        ));
    }

    #[test]
    fn test_non_parent_ancestor_is_linkage_error() {
        let mut input = transfer_input(1000);
        input.witness.ancestors[0].gas_used += 1;
        // No trie work happens, so an empty node set changes nothing
        input.witness.state.clear();

        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WitnessLinkage);
        assert!(err.to_string().contains("first ancestor must be the parent"));
    }

    #[test]
    fn test_malformed_requests() {
        let mut no_blocks = transfer_input(1);
        no_blocks.blocks.clear();
        let err = ProvableExecutor::new().execute(&no_blocks).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);

        let mut no_ancestors = transfer_input(1);
        no_ancestors.witness.ancestors.clear();
        let err = ProvableExecutor::new().execute(&no_ancestors).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[test]
    fn test_tampered_header_is_mismatch() {
        let mut input = transfer_input(1000);
        input.blocks[0].header.state_root = Hash::repeat_byte(0x01);
        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            WitnessEvmError::SelfValidation(crate::Mismatch::StateRoot { .. })
        ));

        let mut input = transfer_input(1000);
        input.blocks[0].header.gas_used = 42_000;
        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            WitnessEvmError::SelfValidation(crate::Mismatch::GasUsed {
                expected: 42_000,
                computed: 21_000
            })
        ));
        assert_eq!(err.kind(), ErrorKind::SelfValidationMismatch);
    }

    #[test]
    fn test_deterministic_execution() {
        let input = transfer_input(1000);
        let first = ProvableExecutor::new().execute(&input).unwrap();
        let second = ProvableExecutor::new().execute(&input).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.hash().unwrap(), second.hash().unwrap());
    }

    #[test]
    fn test_concurrent_validations_match_sequential() {
        let inputs: Vec<ProverInput> = (1..=4).map(transfer_input).collect();
        let executor = &ProvableExecutor::new();

        let sequential: Vec<ExecutionResult> = inputs
            .iter()
            .map(|input| executor.execute(input).unwrap())
            .collect();

        let concurrent: Vec<ExecutionResult> = std::thread::scope(|scope| {
            let handles: Vec<_> = inputs
                .iter()
                .map(|input| scope.spawn(move || executor.execute(input).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(sequential, concurrent);
        assert_ne!(sequential[0].state_root, sequential[1].state_root);
    }
}
