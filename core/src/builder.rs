//! Sample provable inputs
//!
//! Assembles a self-consistent [`ProverInput`] from a declarative pre-state: the witness
//! holds every node of the pre-state trie, and the block header is sealed with the
//! engine's own results. Transactions are signed by [`DevSigner`] keys.

use crate::block::{Block, Header, TxEnvelope, Withdrawal, EMPTY_OMMER_ROOT_HASH};
use crate::chain::{ChainConfig, INITIAL_BASE_FEE};
use crate::errors::{Result, WitnessEvmError};
use crate::executor::ProvableExecutor;
use crate::hashing::keccak256;
use crate::input::{ProverInput, Witness};
use crate::mpt::{self, NoopTrieProvider, TrieNode};
use crate::state::{account_path, AccountState};
use crate::types::{Address, BlockNumber, Bytes, Gas, Hash, Timestamp, B256, U256};
use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec;
use alloc::vec::Vec;
use alloy_consensus::{SignableTransaction, Signed, TxLegacy};
use alloy_primitives::{PrimitiveSignature, TxKind};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_trie::{TrieAccount, EMPTY_ROOT_HASH};
use tracing::debug;

/// Chain id of the development chain sample inputs run on
pub const DEV_CHAIN_ID: u64 = 1337;
/// Legacy gas price of sample transactions, the base fee of the sample parent
pub const DEV_GAS_PRICE: u128 = INITIAL_BASE_FEE as u128;
/// Gas of a plain value transfer
pub const TRANSFER_GAS: Gas = 21_000;

/// Seconds between consecutive sample blocks
const BLOCK_TIME: u64 = 12;
const SAMPLE_GAS_LIMIT: u64 = 30_000_000;

/// Signs sample transactions with a local secp256k1 key
#[derive(Debug, Clone)]
pub struct DevSigner {
    inner: PrivateKeySigner,
}

impl DevSigner {
    /// Deterministic key derived from `seed`
    pub fn from_seed(seed: u64) -> Result<Self> {
        Self::from_secret(keccak256(&seed.to_be_bytes()))
    }

    pub fn from_secret(secret: B256) -> Result<Self> {
        let inner = PrivateKeySigner::from_bytes(&secret)
            .map_err(|err| WitnessEvmError::Signing(err.to_string()))?;
        Ok(Self { inner })
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// Sign `tx` into its EIP-2718 envelope
    pub fn sign<T>(&self, tx: T) -> Result<TxEnvelope>
    where
        T: SignableTransaction<PrimitiveSignature>,
        TxEnvelope: From<Signed<T>>,
    {
        let signature = self
            .inner
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|err| WitnessEvmError::Signing(err.to_string()))?;
        Ok(tx.into_signed(signature).into())
    }

    /// EIP-155 legacy value transfer
    pub fn transfer(&self, chain_id: u64, nonce: u64, to: Address, value: U256) -> Result<TxEnvelope> {
        self.sign(TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: DEV_GAS_PRICE,
            gas_limit: TRANSFER_GAS,
            to: TxKind::Call(to),
            value,
            input: Bytes::new(),
        })
    }

    /// EIP-155 legacy contract call
    pub fn call(
        &self,
        chain_id: u64,
        nonce: u64,
        to: Address,
        input: impl Into<Bytes>,
        gas_limit: Gas,
    ) -> Result<TxEnvelope> {
        self.sign(TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: DEV_GAS_PRICE,
            gas_limit,
            to: TxKind::Call(to),
            value: U256::ZERO,
            input: input.into(),
        })
    }
}

/// State root of `accounts` and every trie node needed to prove them
pub fn state_trie(accounts: &BTreeMap<Address, AccountState>) -> Result<(Hash, Vec<Bytes>)> {
    let mut trie = TrieNode::Empty;
    let mut nodes = Vec::new();
    for (address, account) in accounts {
        let storage = account.storage_trie()?;
        nodes.extend(mpt::encoded_nodes(&storage));
        let leaf = TrieAccount {
            nonce: account.nonce,
            balance: account.balance,
            storage_root: mpt::root_hash(&storage),
            code_hash: account.code_hash,
        };
        trie.insert(
            &account_path(address),
            alloy_rlp::encode(leaf).into(),
            &NoopTrieProvider,
        )?;
    }
    nodes.extend(mpt::encoded_nodes(&trie));
    Ok((mpt::root_hash(&trie), nodes))
}

/// Builder for sample provable inputs
#[derive(Debug, Clone)]
pub struct ProverInputBuilder {
    chain_config: ChainConfig,
    accounts: BTreeMap<Address, AccountState>,
    transactions: Vec<TxEnvelope>,
    withdrawals: Vec<Withdrawal>,
    beneficiary: Address,
    number: BlockNumber,
    timestamp: Timestamp,
    ancestors: usize,
}

impl ProverInputBuilder {
    /// Block 100 on a development chain with every fork active
    pub fn new() -> Self {
        Self {
            chain_config: ChainConfig::dev(DEV_CHAIN_ID),
            accounts: BTreeMap::new(),
            transactions: Vec::new(),
            withdrawals: Vec::new(),
            beneficiary: Address::ZERO,
            number: 100,
            timestamp: 1_700_000_000,
            ancestors: 1,
        }
    }

    pub fn with_chain_config(mut self, chain_config: ChainConfig) -> Self {
        self.chain_config = chain_config;
        self
    }

    /// Add (or replace) a pre-state account
    pub fn with_account(mut self, address: Address, account: AccountState) -> Self {
        self.accounts.insert(address, account);
        self
    }

    /// Append a signed transaction to the block body
    pub fn with_transaction(mut self, tx: TxEnvelope) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn with_withdrawal(mut self, withdrawal: Withdrawal) -> Self {
        self.withdrawals.push(withdrawal);
        self
    }

    pub fn with_beneficiary(mut self, beneficiary: Address) -> Self {
        self.beneficiary = beneficiary;
        self
    }

    /// Number of ancestor headers in the witness, at least the parent
    pub fn with_ancestors(mut self, count: usize) -> Self {
        self.ancestors = count.max(1);
        self
    }

    /// The declared pre-state
    pub fn state(&self) -> BTreeMap<Address, AccountState> {
        self.accounts.clone()
    }

    /// Assemble the witness and seal the block
    pub fn build(self) -> Result<ProverInput> {
        let (state_root, state) = state_trie(&self.accounts)?;
        let codes: Vec<Bytes> = self
            .accounts
            .values()
            .filter(|account| account.is_contract())
            .map(|account| account.code.clone())
            .collect();
        let ancestors = self.ancestor_headers(state_root);
        let header = self.block_header(&ancestors[0])?;

        let config = &self.chain_config;
        let withdrawals = config
            .is_shanghai(self.timestamp)
            .then(|| self.withdrawals.clone());
        let mut block = Block {
            header,
            transactions: self.transactions.clone(),
            withdrawals,
        };
        block.header.transactions_root = block.transactions_root();
        block.header.withdrawals_root = block.withdrawals_root();

        let mut input = ProverInput::new(
            self.chain_config.clone(),
            vec![block],
            Witness {
                ancestors,
                codes,
                state,
            },
        );

        let result = ProvableExecutor::unchecked().execute(&input)?;
        let header = &mut input.blocks[0].header;
        header.state_root = result.state_root;
        header.receipts_root = result.receipts_root;
        header.logs_bloom = result.logs_bloom;
        header.gas_used = result.gas_used;
        if header.blob_gas_used.is_some() {
            header.blob_gas_used = Some(result.blob_gas_used);
        }
        debug!(
            number = header.number,
            state_root = %header.state_root,
            nodes = input.witness.state.len(),
            "sealed sample block"
        );
        Ok(input)
    }

    /// Ancestors of the block, parent first
    fn ancestor_headers(&self, state_root: Hash) -> Vec<Header> {
        let mut headers: Vec<Header> = Vec::with_capacity(self.ancestors);
        for distance in (1..=self.ancestors as u64).rev() {
            let parent_hash = headers.last().map(Header::hash_slow).unwrap_or_default();
            headers.push(self.ancestor(distance, parent_hash, state_root));
        }
        headers.reverse();
        headers
    }

    fn ancestor(&self, distance: u64, parent_hash: Hash, state_root: Hash) -> Header {
        let config = &self.chain_config;
        let timestamp = self.timestamp.saturating_sub(distance * BLOCK_TIME);
        let cancun = config.is_cancun(timestamp);
        Header {
            parent_hash,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            state_root,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            number: self.number.saturating_sub(distance),
            gas_limit: SAMPLE_GAS_LIMIT,
            gas_used: SAMPLE_GAS_LIMIT / 2,
            timestamp,
            base_fee_per_gas: Some(INITIAL_BASE_FEE),
            withdrawals_root: config.is_shanghai(timestamp).then_some(EMPTY_ROOT_HASH),
            blob_gas_used: cancun.then_some(0),
            excess_blob_gas: cancun.then_some(0),
            parent_beacon_block_root: cancun.then(|| B256::repeat_byte(0xbe)),
            ..Default::default()
        }
    }

    /// Unsealed header of the block on top of `parent`
    fn block_header(&self, parent: &Header) -> Result<Header> {
        let config = &self.chain_config;
        let cancun = config.is_cancun(self.timestamp);
        Ok(Header {
            parent_hash: parent.hash_slow(),
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            beneficiary: self.beneficiary,
            number: self.number,
            gas_limit: parent.gas_limit,
            timestamp: self.timestamp,
            mix_hash: B256::repeat_byte(0x42),
            base_fee_per_gas: Some(config.next_base_fee(parent)?),
            withdrawals_root: config.is_shanghai(self.timestamp).then_some(EMPTY_ROOT_HASH),
            blob_gas_used: cancun.then_some(0),
            excess_blob_gas: cancun.then(|| config.next_excess_blob_gas(parent)),
            parent_beacon_block_root: cancun.then(|| B256::repeat_byte(0xbe)),
            ..Default::default()
        })
    }
}

impl Default for ProverInputBuilder {
    fn default() -> Self {
        Self::new()
    }
}
