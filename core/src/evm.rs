//! Block execution engine for Witness-EVM
//!
//! Wraps `revm` to run a whole block against a [`PreStateView`]. Every account, slot,
//! code and ancestor hash revm asks for is answered out of the witness, so an incomplete
//! witness aborts execution with the lookup that failed.

use crate::block::{blob_gas, Block, Header, TxEnvelope, Withdrawal};
use crate::chain::{blob_gasprice, ChainContext, MAX_BLOB_GAS_PER_BLOCK};
use crate::errors::{ErrorKind, Mismatch, Result, WitnessEvmError};
use crate::mpt::ordered_trie_root;
use crate::output::{ExecutionResult, Log, Receipt};
use crate::state::PreStateView;
use crate::types::{Address, Bloom, Gas, Hash, GWEI_TO_WEI, U256};
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use alloy_consensus::Transaction as _;
use alloy_primitives::address;
use alloy_rlp::BufMut;
use revm::primitives::{
    AccessListItem, AccountInfo, BlobExcessGasAndPrice, BlockEnv, Bytecode, EVMError, SpecId,
    TxEnv, KECCAK_EMPTY,
};
use revm::{Database, Evm};
use tracing::{debug, trace};

/// EIP-4788 beacon roots contract
pub const BEACON_ROOTS_ADDRESS: Address = address!("000F3df6D732807Ef1319fB7B8bB8522d0Beac02");
/// Length of the beacon roots ring buffer
pub const HISTORY_BUFFER_LENGTH: u64 = 8191;

/// Everything one block execution needs
#[derive(Debug)]
pub struct ExecParams<'a> {
    pub block: &'a Block,
    pub parent: &'a Header,
    pub chain: ChainContext<'a>,
    pub state: PreStateView<'a>,
    /// Check the computed result against the block's claims
    pub validate: bool,
    /// Treat every missing lookup as an error
    pub self_validating: bool,
}

impl<'a> ExecParams<'a> {
    /// Parameters with validation and self-validating lookups enabled
    pub fn new(
        block: &'a Block,
        parent: &'a Header,
        chain: ChainContext<'a>,
        state: PreStateView<'a>,
    ) -> Self {
        Self {
            block,
            parent,
            chain,
            state,
            validate: true,
            self_validating: true,
        }
    }

    /// Toggle checking the result against the block header
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

/// revm database over the pre-state view and chain context
struct WitnessDatabase<'a> {
    state: PreStateView<'a>,
    chain: ChainContext<'a>,
    header: &'a Header,
    self_validating: bool,
}

impl WitnessDatabase<'_> {
    /// Outside self-validating mode a missing code or header reads as empty
    fn tolerate<T: Default>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(err) if !self.self_validating && err.kind() == ErrorKind::InsufficientWitness => {
                trace!(error = %err, "tolerating missing witness entry");
                Ok(T::default())
            }
            other => other,
        }
    }
}

impl Database for WitnessDatabase<'_> {
    type Error = WitnessEvmError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>> {
        self.state.account(address)
    }

    fn code_by_hash(&mut self, code_hash: Hash) -> Result<Bytecode> {
        let code = self.state.code(code_hash);
        self.tolerate(code)
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256> {
        self.state.storage(address, index)
    }

    fn block_hash(&mut self, number: u64) -> Result<Hash> {
        let hash = self.chain.block_hash(self.header, number);
        self.tolerate(hash)
    }
}

/// Witness-EVM block engine
///
/// Deterministic: the same parameters always produce the same result.
pub struct BlockEngine;

impl BlockEngine {
    /// Execute the block and, if requested, check it against its header
    pub fn execute(params: ExecParams<'_>) -> Result<ExecutionResult> {
        let ExecParams {
            block,
            parent,
            chain,
            state,
            validate,
            self_validating,
        } = params;
        let header = &block.header;
        let config = chain.config();
        let spec_id = config.spec_id(header.number, header.timestamp)?;
        let cancun = spec_id.is_enabled_in(SpecId::CANCUN);
        let shanghai = spec_id.is_enabled_in(SpecId::SHANGHAI);

        if validate {
            chain.validate_header(header, parent)?;
            Self::validate_body(block, shanghai)?;
        }

        let mut db = WitnessDatabase {
            state,
            chain,
            header,
            self_validating,
        };

        if cancun {
            Self::apply_beacon_root(&mut db.state, header)?;
        }

        let block_env = Self::build_block_env(&chain, header, parent, cancun)?;
        let mut receipts = Vec::with_capacity(block.transactions.len());
        let mut logs = Vec::new();
        let mut cumulative_gas_used: Gas = 0;
        let mut blob_gas_used: Gas = 0;

        for (index, tx) in block.transactions.iter().enumerate() {
            let caller = Self::recover_sender(index, tx)?;
            let available = header.gas_limit.saturating_sub(cumulative_gas_used);
            if tx.gas_limit() > available {
                return Err(WitnessEvmError::GasLimitExceeded {
                    index,
                    wanted: tx.gas_limit(),
                    available,
                });
            }
            if cancun {
                blob_gas_used += blob_gas(tx);
                if blob_gas_used > MAX_BLOB_GAS_PER_BLOCK {
                    return Err(WitnessEvmError::InvalidTransaction {
                        index,
                        reason: format!("block blob gas {blob_gas_used} above maximum"),
                    });
                }
            }

            let outcome = {
                let mut evm = Evm::builder()
                    .with_db(&mut db)
                    .with_spec_id(spec_id)
                    .modify_cfg_env(|c| c.chain_id = chain.chain_id())
                    .modify_block_env(|b| *b = block_env.clone())
                    .modify_tx_env(|t| *t = Self::build_tx_env(tx, caller))
                    .build();
                evm.transact()
                    .map_err(|err| Self::map_evm_error(index, err))?
            };
            db.state.commit(outcome.state)?;

            let result = outcome.result;
            cumulative_gas_used += result.gas_used();
            let tx_logs = Self::convert_logs(result.logs());
            debug!(
                index,
                hash = %tx.tx_hash(),
                %caller,
                success = result.is_success(),
                gas_used = result.gas_used(),
                logs = tx_logs.len(),
                "transaction executed"
            );
            logs.extend(tx_logs.iter().cloned());
            receipts.push(Receipt::new(
                tx.tx_type(),
                result.is_success(),
                cumulative_gas_used,
                tx_logs,
            ));
        }

        if shanghai {
            if let Some(withdrawals) = &block.withdrawals {
                Self::apply_withdrawals(&mut db.state, withdrawals)?;
            }
        }

        let state_root = db.state.state_root()?;
        let receipts_root =
            ordered_trie_root(&receipts, |receipt, buf| buf.put_slice(&receipt.encoded()));
        let mut logs_bloom = Bloom::ZERO;
        for receipt in &receipts {
            logs_bloom.accrue_bloom(&receipt.logs_bloom);
        }

        let result = ExecutionResult {
            receipts,
            gas_used: cumulative_gas_used,
            state_root,
            receipts_root,
            logs_bloom,
            blob_gas_used,
            logs,
        };
        debug!(
            number = header.number,
            gas_used = result.gas_used,
            %state_root,
            "block executed"
        );

        if validate {
            Self::check_result(header, &result, cancun)?;
        }
        Ok(result)
    }

    /// Transactions root, plus withdrawals presence and root
    fn validate_body(block: &Block, shanghai: bool) -> Result<()> {
        let header = &block.header;
        let transactions_root = block.transactions_root();
        if transactions_root != header.transactions_root {
            return Err(WitnessEvmError::InvalidBlock(format!(
                "transactions root {transactions_root} differs from header {}",
                header.transactions_root
            )));
        }

        match (block.withdrawals_root(), header.withdrawals_root) {
            (None, None) if !shanghai => Ok(()),
            (Some(root), Some(expected)) if shanghai => {
                if root != expected {
                    return Err(WitnessEvmError::InvalidBlock(format!(
                        "withdrawals root {root} differs from header {expected}"
                    )));
                }
                Ok(())
            }
            _ => Err(WitnessEvmError::InvalidBlock(
                "withdrawals do not match fork".into(),
            )),
        }
    }

    /// EIP-4788: store the parent beacon block root in the ring buffer
    fn apply_beacon_root(state: &mut PreStateView<'_>, header: &Header) -> Result<()> {
        let Some(root) = header.parent_beacon_block_root else {
            return Err(WitnessEvmError::InvalidBlock(
                "missing parent beacon block root".into(),
            ));
        };
        let deployed = state
            .account(BEACON_ROOTS_ADDRESS)?
            .is_some_and(|info| info.code_hash != KECCAK_EMPTY);
        if !deployed {
            trace!("beacon roots contract not deployed");
            return Ok(());
        }

        let index = header.timestamp % HISTORY_BUFFER_LENGTH;
        state.set_storage(
            BEACON_ROOTS_ADDRESS,
            U256::from(index),
            U256::from(header.timestamp),
        )?;
        state.set_storage(
            BEACON_ROOTS_ADDRESS,
            U256::from(index + HISTORY_BUFFER_LENGTH),
            U256::from_be_bytes(root.0),
        )
    }

    /// EIP-4895: credit withdrawals, converting gwei to wei
    fn apply_withdrawals(state: &mut PreStateView<'_>, withdrawals: &[Withdrawal]) -> Result<()> {
        for withdrawal in withdrawals.iter().filter(|w| w.amount > 0) {
            let amount = U256::from(withdrawal.amount) * U256::from(GWEI_TO_WEI);
            state.increment_balance(withdrawal.address, amount)?;
        }
        Ok(())
    }

    /// Compare the computed post-state with the header's claims
    fn check_result(header: &Header, result: &ExecutionResult, cancun: bool) -> Result<()> {
        if result.gas_used != header.gas_used {
            return Err(Mismatch::GasUsed {
                expected: header.gas_used,
                computed: result.gas_used,
            }
            .into());
        }
        if result.logs_bloom != header.logs_bloom {
            return Err(Mismatch::LogsBloom.into());
        }
        if result.receipts_root != header.receipts_root {
            return Err(Mismatch::ReceiptsRoot {
                expected: header.receipts_root,
                computed: result.receipts_root,
            }
            .into());
        }
        if result.state_root != header.state_root {
            return Err(Mismatch::StateRoot {
                expected: header.state_root,
                computed: result.state_root,
            }
            .into());
        }
        if cancun && header.blob_gas_used != Some(result.blob_gas_used) {
            return Err(Mismatch::BlobGasUsed {
                expected: header.blob_gas_used,
                computed: result.blob_gas_used,
            }
            .into());
        }
        Ok(())
    }

    fn build_block_env(
        chain: &ChainContext<'_>,
        header: &Header,
        parent: &Header,
        cancun: bool,
    ) -> Result<BlockEnv> {
        let blob_excess_gas_and_price = if cancun {
            let excess_blob_gas = header
                .excess_blob_gas
                .unwrap_or_else(|| chain.config().next_excess_blob_gas(parent));
            Some(BlobExcessGasAndPrice {
                excess_blob_gas,
                blob_gasprice: blob_gasprice(excess_blob_gas)?,
            })
        } else {
            None
        };
        let basefee = header.base_fee_per_gas.ok_or_else(|| {
            WitnessEvmError::InvalidBlock(format!("block {} has no base fee", header.number))
        })?;

        Ok(BlockEnv {
            number: U256::from(header.number),
            coinbase: header.beneficiary,
            timestamp: U256::from(header.timestamp),
            gas_limit: U256::from(header.gas_limit),
            basefee: U256::from(basefee),
            difficulty: header.difficulty,
            prevrandao: Some(header.mix_hash),
            blob_excess_gas_and_price,
            ..Default::default()
        })
    }

    /// Signer of transaction `index`; set-code transactions are not supported
    fn recover_sender(index: usize, tx: &TxEnvelope) -> Result<Address> {
        if matches!(tx, TxEnvelope::Eip7702(_)) {
            return Err(WitnessEvmError::InvalidTransaction {
                index,
                reason: "set-code transactions are not supported".into(),
            });
        }
        tx.recover_signer()
            .map_err(|err| WitnessEvmError::InvalidTransaction {
                index,
                reason: format!("sender recovery failed: {err}"),
            })
    }

    fn build_tx_env(tx: &TxEnvelope, caller: Address) -> TxEnv {
        TxEnv {
            caller,
            gas_limit: tx.gas_limit(),
            gas_price: U256::from(tx.max_fee_per_gas()),
            transact_to: tx.kind(),
            value: tx.value(),
            data: tx.input().clone(),
            nonce: Some(tx.nonce()),
            chain_id: tx.chain_id(),
            access_list: tx
                .access_list()
                .map(|list| {
                    list.iter()
                        .map(|item| AccessListItem {
                            address: item.address,
                            storage_keys: item.storage_keys.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            gas_priority_fee: tx.max_priority_fee_per_gas().map(U256::from),
            blob_hashes: tx
                .blob_versioned_hashes()
                .map(<[Hash]>::to_vec)
                .unwrap_or_default(),
            max_fee_per_blob_gas: tx.max_fee_per_blob_gas().map(U256::from),
            ..Default::default()
        }
    }

    /// Sort revm failures into the validation taxonomy
    fn map_evm_error(index: usize, err: EVMError<WitnessEvmError>) -> WitnessEvmError {
        match err {
            EVMError::Database(err) => err,
            EVMError::Transaction(err) => WitnessEvmError::InvalidTransaction {
                index,
                reason: err.to_string(),
            },
            EVMError::Header(err) => WitnessEvmError::InvalidBlock(err.to_string()),
            other => WitnessEvmError::ExecutionFailed {
                index,
                reason: other.to_string(),
            },
        }
    }

    /// Convert revm logs to Witness-EVM logs
    fn convert_logs(logs: &[revm::primitives::Log]) -> Vec<Log> {
        logs.iter()
            .map(|log| Log::new(log.address, log.topics().to_vec(), log.data.data.clone()))
            .collect()
    }
}
