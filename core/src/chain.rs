//! Chain configuration and the per-validation chain context
//!
//! The context answers ancestor lookups out of the witness store and applies the fork
//! rules: fork selection, header validity, EIP-1559 base fee and EIP-4844 blob gas.

use crate::block::{Header, EMPTY_OMMER_ROOT_HASH};
use crate::errors::{Result, WitnessEntry, WitnessEvmError};
use crate::store::WitnessStore;
use crate::types::{BlockNumber, Gas, Hash, Timestamp, B64, U256};
use alloc::format;
use alloy_eips::eip4844::DATA_GAS_PER_BLOB;
use revm::primitives::SpecId;
use serde::{Deserialize, Serialize};

/// Base fee of the first London block
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;
/// EIP-1559 elasticity multiplier
pub const ELASTICITY_MULTIPLIER: u64 = 2;
/// EIP-1559 base fee max change denominator
pub const BASE_FEE_MAX_CHANGE_DENOMINATOR: u64 = 8;
/// Gas limit may move by less than parent / 1024 per block
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;
pub const MIN_GAS_LIMIT: Gas = 5_000;
pub const MAX_EXTRA_DATA_SIZE: usize = 32;
/// EIP-4844 target blob gas per block (3 blobs)
pub const TARGET_BLOB_GAS_PER_BLOCK: Gas = 3 * DATA_GAS_PER_BLOB;
/// EIP-4844 max blob gas per block (6 blobs)
pub const MAX_BLOB_GAS_PER_BLOCK: Gas = 6 * DATA_GAS_PER_BLOB;
pub const MIN_BLOB_GASPRICE: u128 = 1;
pub const BLOB_GASPRICE_UPDATE_FRACTION: u128 = 3_338_477;
/// Largest excess blob gas priced; the blob gas price there is about `e ** 40` wei
pub const MAX_EXCESS_BLOB_GAS: Gas = 1 << 27;

/// Fork activations of one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub london_block: BlockNumber,
    /// First proof-of-stake block
    pub paris_block: BlockNumber,
    #[serde(default)]
    pub shanghai_time: Option<Timestamp>,
    #[serde(default)]
    pub cancun_time: Option<Timestamp>,
}

impl ChainConfig {
    /// Ethereum mainnet
    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            london_block: 12_965_000,
            paris_block: 15_537_394,
            shanghai_time: Some(1_681_338_455),
            cancun_time: Some(1_710_338_135),
        }
    }

    /// Development chain with every supported fork active from genesis
    pub fn dev(chain_id: u64) -> Self {
        Self {
            chain_id,
            london_block: 0,
            paris_block: 0,
            shanghai_time: Some(0),
            cancun_time: Some(0),
        }
    }

    /// Check that the configuration can drive execution
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(WitnessEvmError::InvalidChainConfig(
                "chain id must be non-zero".into(),
            ));
        }
        if self.paris_block < self.london_block {
            return Err(WitnessEvmError::InvalidChainConfig(format!(
                "paris block {} precedes london block {}",
                self.paris_block, self.london_block
            )));
        }
        match (self.shanghai_time, self.cancun_time) {
            (None, Some(_)) => Err(WitnessEvmError::InvalidChainConfig(
                "cancun scheduled without shanghai".into(),
            )),
            (Some(shanghai), Some(cancun)) if cancun < shanghai => {
                Err(WitnessEvmError::InvalidChainConfig(format!(
                    "cancun time {cancun} precedes shanghai time {shanghai}"
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn is_london(&self, number: BlockNumber) -> bool {
        number >= self.london_block
    }

    pub fn is_paris(&self, number: BlockNumber) -> bool {
        number >= self.paris_block
    }

    pub fn is_shanghai(&self, timestamp: Timestamp) -> bool {
        self.shanghai_time.is_some_and(|t| timestamp >= t)
    }

    pub fn is_cancun(&self, timestamp: Timestamp) -> bool {
        self.cancun_time.is_some_and(|t| timestamp >= t)
    }

    /// Execution rules for a block. Only proof-of-stake blocks are supported.
    pub fn spec_id(&self, number: BlockNumber, timestamp: Timestamp) -> Result<SpecId> {
        if !self.is_paris(number) {
            return Err(WitnessEvmError::InvalidBlock(format!(
                "block {number} predates the merge"
            )));
        }
        Ok(if self.is_cancun(timestamp) {
            SpecId::CANCUN
        } else if self.is_shanghai(timestamp) {
            SpecId::SHANGHAI
        } else {
            SpecId::MERGE
        })
    }

    /// EIP-1559 base fee of the child of `parent`
    pub fn next_base_fee(&self, parent: &Header) -> Result<u64> {
        if !self.is_london(parent.number) {
            return Ok(INITIAL_BASE_FEE);
        }
        let parent_fee = parent.base_fee_per_gas.ok_or_else(|| {
            WitnessEvmError::InvalidBlock(format!(
                "london block {} has no base fee",
                parent.number
            ))
        })?;
        let base_fee = parent_fee as u128;
        let target = (parent.gas_limit / ELASTICITY_MULTIPLIER) as u128;
        let used = parent.gas_used as u128;
        let denominator = BASE_FEE_MAX_CHANGE_DENOMINATOR as u128;
        if target == 0 || used == target {
            return Ok(parent_fee);
        }

        Ok(if used > target {
            let delta = (base_fee * (used - target) / target / denominator).max(1);
            (base_fee + delta).min(u64::MAX as u128) as u64
        } else {
            let delta = base_fee * (target - used) / target / denominator;
            base_fee.saturating_sub(delta) as u64
        })
    }

    /// EIP-4844 excess blob gas of the child of `parent`
    pub fn next_excess_blob_gas(&self, parent: &Header) -> Gas {
        if !self.is_cancun(parent.timestamp) {
            return 0;
        }
        let excess = parent.excess_blob_gas.unwrap_or_default();
        let used = parent.blob_gas_used.unwrap_or_default();
        excess
            .saturating_add(used)
            .saturating_sub(TARGET_BLOB_GAS_PER_BLOCK)
    }
}

/// Price per unit of blob gas for a given excess, up to [`MAX_EXCESS_BLOB_GAS`]
pub fn blob_gasprice(excess_blob_gas: Gas) -> Result<u128> {
    if excess_blob_gas > MAX_EXCESS_BLOB_GAS {
        return Err(WitnessEvmError::InvalidBlock(format!(
            "excess blob gas {excess_blob_gas} exceeds {MAX_EXCESS_BLOB_GAS}"
        )));
    }
    Ok(fake_exponential(
        MIN_BLOB_GASPRICE,
        excess_blob_gas as u128,
        BLOB_GASPRICE_UPDATE_FRACTION,
    ))
}

/// Integer approximation of `factor * e ** (numerator / denominator)`
fn fake_exponential(factor: u128, numerator: u128, denominator: u128) -> u128 {
    let mut i = 1;
    let mut output = 0u128;
    let mut accum = factor * denominator;
    while accum > 0 {
        output = output.saturating_add(accum);
        accum = accum.saturating_mul(numerator) / (denominator * i);
        i += 1;
    }
    output / denominator
}

/// Chain view for one validation: configuration plus the witnessed ancestor headers
#[derive(Debug, Clone, Copy)]
pub struct ChainContext<'a> {
    config: &'a ChainConfig,
    store: &'a WitnessStore,
}

impl<'a> ChainContext<'a> {
    /// Build a context; fails only if `config` is unusable
    pub fn new(config: &'a ChainConfig, store: &'a WitnessStore) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &'a ChainConfig {
        self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Hash of ancestor `number` of `block`, found by walking parent links.
    ///
    /// The caller keeps `number` below `block.number`.
    pub fn block_hash(&self, block: &Header, number: BlockNumber) -> Result<Hash> {
        let mut hash = block.parent_hash;
        let mut current = block.number.saturating_sub(1);
        while current > number {
            let header = self
                .store
                .header_by_hash(hash)
                .ok_or(WitnessEvmError::InsufficientWitness {
                    entry: WitnessEntry::Header,
                    hash,
                })?;
            if header.number != current {
                return Err(WitnessEvmError::InvalidWitness(format!(
                    "ancestor {hash} has number {}, expected {current}",
                    header.number
                )));
            }
            hash = header.parent_hash;
            current -= 1;
        }
        Ok(hash)
    }

    /// Consensus checks of `header` against its parent
    pub fn validate_header(&self, header: &Header, parent: &Header) -> Result<()> {
        let invalid = |reason: alloc::string::String| Err(WitnessEvmError::InvalidBlock(reason));

        if parent.number.checked_add(1) != Some(header.number) {
            return invalid(format!(
                "block number {} does not follow parent {}",
                header.number, parent.number
            ));
        }
        if header.parent_hash != parent.hash_slow() {
            return invalid("parent hash does not match parent header".into());
        }
        if header.timestamp <= parent.timestamp {
            return invalid(format!(
                "timestamp {} not after parent timestamp {}",
                header.timestamp, parent.timestamp
            ));
        }
        if header.gas_used > header.gas_limit {
            return invalid(format!(
                "gas used {} exceeds gas limit {}",
                header.gas_used, header.gas_limit
            ));
        }
        let limit = parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR;
        if header.gas_limit.abs_diff(parent.gas_limit) >= limit || header.gas_limit < MIN_GAS_LIMIT
        {
            return invalid(format!(
                "gas limit {} out of bounds (parent {})",
                header.gas_limit, parent.gas_limit
            ));
        }
        if header.extra_data.len() > MAX_EXTRA_DATA_SIZE {
            return invalid(format!("extra data of {} bytes", header.extra_data.len()));
        }
        if header.difficulty != U256::ZERO
            || header.nonce != B64::ZERO
            || header.ommers_hash != EMPTY_OMMER_ROOT_HASH
        {
            return invalid("proof-of-work fields set after the merge".into());
        }
        let base_fee = self.config.next_base_fee(parent)?;
        if header.base_fee_per_gas != Some(base_fee) {
            return invalid(format!(
                "base fee {:?} differs from expected {base_fee}",
                header.base_fee_per_gas
            ));
        }

        let shanghai = self.config.is_shanghai(header.timestamp);
        if shanghai != header.withdrawals_root.is_some() {
            return invalid("withdrawals root presence does not match fork".into());
        }

        if !self.config.is_cancun(header.timestamp) {
            if header.blob_gas_used.is_some()
                || header.excess_blob_gas.is_some()
                || header.parent_beacon_block_root.is_some()
            {
                return invalid("cancun fields before cancun".into());
            }
            return Ok(());
        }
        let (Some(blob_gas_used), Some(excess), Some(_)) = (
            header.blob_gas_used,
            header.excess_blob_gas,
            header.parent_beacon_block_root,
        ) else {
            return invalid("cancun fields missing".into());
        };
        if blob_gas_used > MAX_BLOB_GAS_PER_BLOCK || blob_gas_used % DATA_GAS_PER_BLOB != 0 {
            return invalid(format!("blob gas used {blob_gas_used} is invalid"));
        }
        let expected = self.config.next_excess_blob_gas(parent);
        if excess != expected {
            return invalid(format!(
                "excess blob gas {excess} differs from expected {expected}"
            ));
        }
        blob_gasprice(excess)?;
        Ok(())
    }
}
