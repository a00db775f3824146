//! Witness-backed state for Witness-EVM
//!
//! [`PreStateView`] resolves accounts and storage slots by walking the partial state trie
//! rooted at the parent block's state root. It is a write-back overlay: execution results
//! are committed into it and `state_root` folds them back into the trie.

use crate::block::{Block, Header};
use crate::errors::{Result, WitnessEvmError};
use crate::hashing::keccak256;
use crate::mpt::{self, blinded, hashed_path, Nibbles, NoopTrieProvider, TrieNode};
use crate::store::WitnessStore;
use crate::types::{Address, Bytes, Hash, U256};
use alloc::collections::btree_map::Entry;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use alloy_rlp::Decodable;
use alloy_trie::{TrieAccount, EMPTY_ROOT_HASH};
use revm::primitives::{AccountInfo, Bytecode, EvmState, KECCAK_EMPTY};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Account state representation
///
/// Declarative account used to assemble pre-states:
/// - Balance in wei
/// - Transaction nonce
/// - Contract code and its hash
/// - Storage slots
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    /// Account balance in wei
    pub balance: U256,
    /// Transaction nonce
    pub nonce: u64,
    /// Hash of contract code (KECCAK_EMPTY if EOA)
    pub code_hash: Hash,
    /// Contract bytecode (empty for EOA)
    pub code: Bytes,
    /// Storage slots (key -> value)
    pub storage: BTreeMap<U256, U256>,
}

impl AccountState {
    /// Create a new externally owned account (EOA) with balance
    pub fn new_with_balance(balance: U256) -> Self {
        Self {
            balance,
            nonce: 0,
            code_hash: KECCAK_EMPTY,
            code: Bytes::new(),
            storage: BTreeMap::new(),
        }
    }

    /// Create a contract account with code
    pub fn new_contract(code: impl Into<Bytes>, balance: U256) -> Self {
        Self::new_contract_with_storage(code, balance, BTreeMap::new())
    }

    /// Create a contract account with code and storage
    pub fn new_contract_with_storage(
        code: impl Into<Bytes>,
        balance: U256,
        storage: BTreeMap<U256, U256>,
    ) -> Self {
        let code = code.into();
        Self {
            balance,
            nonce: 1, // Contracts start with nonce 1
            code_hash: keccak256(&code),
            code,
            storage,
        }
    }

    /// Check if this is a contract account
    pub fn is_contract(&self) -> bool {
        !self.code.is_empty()
    }

    /// Set a storage slot value
    pub fn set_storage(&mut self, slot: U256, value: U256) {
        if value.is_zero() {
            self.storage.remove(&slot);
        } else {
            self.storage.insert(slot, value);
        }
    }

    /// Get a storage slot value
    pub fn get_storage(&self, slot: &U256) -> U256 {
        self.storage.get(slot).copied().unwrap_or(U256::ZERO)
    }

    /// Storage trie of this account
    pub fn storage_trie(&self) -> Result<TrieNode> {
        let mut trie = TrieNode::Empty;
        for (slot, value) in &self.storage {
            if !value.is_zero() {
                trie.insert(
                    &slot_path(slot),
                    alloy_rlp::encode(*value).into(),
                    &NoopTrieProvider,
                )?;
            }
        }
        Ok(trie)
    }
}

pub(crate) fn account_path(address: &Address) -> Nibbles {
    hashed_path(address.as_slice())
}

fn slot_path(slot: &U256) -> Nibbles {
    hashed_path(&slot.to_be_bytes::<32>())
}

/// An account as seen during execution
#[derive(Debug, Clone)]
struct CachedAccount {
    /// None if the account does not exist (or was destroyed)
    info: Option<AccountInfo>,
    storage_trie: TrieNode,
    /// Slot values read or written so far
    storage: BTreeMap<U256, U256>,
    dirty_slots: BTreeSet<U256>,
    dirty: bool,
}

impl CachedAccount {
    fn missing() -> Self {
        Self {
            info: None,
            storage_trie: TrieNode::Empty,
            storage: BTreeMap::new(),
            dirty_slots: BTreeSet::new(),
            dirty: false,
        }
    }

    fn destroy(&mut self) {
        self.info = None;
        self.clear_storage();
        self.dirty = true;
    }

    fn clear_storage(&mut self) {
        self.storage_trie = TrieNode::Empty;
        self.storage.clear();
        self.dirty_slots.clear();
    }
}

/// Read/write view of the state at a historical state root
#[derive(Debug)]
pub struct PreStateView<'a> {
    store: &'a WitnessStore,
    trie: TrieNode,
    accounts: BTreeMap<Address, CachedAccount>,
    /// Codes deployed during execution
    codes: BTreeMap<Hash, Bytes>,
}

impl<'a> PreStateView<'a> {
    /// Open the view at `root`; the root node itself must be in the store
    pub fn open(store: &'a WitnessStore, root: Hash) -> Result<Self> {
        if root != EMPTY_ROOT_HASH && !store.contains_node(&root) {
            return Err(WitnessEvmError::MissingRoot(root));
        }
        Ok(Self {
            store,
            trie: blinded(root),
            accounts: BTreeMap::new(),
            codes: BTreeMap::new(),
        })
    }

    /// Open the view for executing `block` on top of `ancestors[0]`
    ///
    /// The first ancestor must be the block's parent, checked by hash before any trie work.
    pub fn for_block(store: &'a WitnessStore, block: &Block, ancestors: &[Header]) -> Result<Self> {
        let parent = ancestors.first().ok_or_else(|| {
            WitnessEvmError::MalformedRequest("witness contains no ancestor headers".into())
        })?;
        let parent_hash = parent.hash_slow();
        if block.header.parent_hash != parent_hash {
            return Err(WitnessEvmError::WitnessLinkage {
                block_number: block.header.number,
                expected: block.header.parent_hash,
                actual: parent_hash,
            });
        }
        debug!(root = %parent.state_root, parent = parent.number, "opening pre-state view");
        Self::open(store, parent.state_root)
    }

    fn load(&mut self, address: Address) -> Result<&mut CachedAccount> {
        let entry = match self.accounts.entry(address) {
            Entry::Occupied(entry) => return Ok(entry.into_mut()),
            Entry::Vacant(entry) => entry,
        };
        let account = match self.trie.open(&account_path(&address), self.store)? {
            None => CachedAccount::missing(),
            Some(rlp) => {
                let account = TrieAccount::decode(&mut rlp.as_ref())?;
                CachedAccount {
                    info: Some(AccountInfo {
                        balance: account.balance,
                        nonce: account.nonce,
                        code_hash: account.code_hash,
                        code: None,
                    }),
                    storage_trie: blinded(account.storage_root),
                    ..CachedAccount::missing()
                }
            }
        };
        trace!(%address, exists = account.info.is_some(), "loaded account");
        Ok(entry.insert(account))
    }

    /// Current account info, code left for [`Self::code`]
    pub fn account(&mut self, address: Address) -> Result<Option<AccountInfo>> {
        Ok(self.load(address)?.info.clone())
    }

    /// Contract code by hash
    pub fn code(&self, code_hash: Hash) -> Result<Bytecode> {
        if code_hash == KECCAK_EMPTY {
            return Ok(Bytecode::default());
        }
        let bytes = match self.codes.get(&code_hash) {
            Some(bytes) => bytes,
            None => self.store.code(code_hash)?,
        };
        Ok(Bytecode::new_raw(bytes.clone()))
    }

    /// Current value of a storage slot
    pub fn storage(&mut self, address: Address, slot: U256) -> Result<U256> {
        let store = self.store;
        let account = self.load(address)?;
        if let Some(value) = account.storage.get(&slot) {
            return Ok(*value);
        }
        let value = match account.storage_trie.open(&slot_path(&slot), store)? {
            Some(rlp) => U256::decode(&mut rlp.as_ref())?,
            None => U256::ZERO,
        };
        account.storage.insert(slot, value);
        Ok(value)
    }

    /// Write a storage slot of an existing account
    pub fn set_storage(&mut self, address: Address, slot: U256, value: U256) -> Result<()> {
        let account = self.load(address)?;
        account.storage.insert(slot, value);
        account.dirty_slots.insert(slot);
        account.dirty = true;
        Ok(())
    }

    /// Credit `amount` wei, creating the account if needed
    pub fn increment_balance(&mut self, address: Address, amount: U256) -> Result<()> {
        let account = self.load(address)?;
        let mut info = account.info.take().unwrap_or_default();
        info.balance = info.balance.saturating_add(amount);
        // Touched empty accounts are removed (EIP-161)
        if !info.is_empty() {
            account.info = Some(info);
        }
        account.dirty = true;
        Ok(())
    }

    /// Commit one transaction's state diff
    pub fn commit(&mut self, changes: EvmState) -> Result<()> {
        for (address, mut account) in changes {
            if !account.is_touched() {
                continue;
            }
            if let Some(code) = account.info.code.take() {
                if !code.is_empty() {
                    self.codes
                        .insert(account.info.code_hash, code.original_bytes());
                }
            }

            let cached = self.load(address)?;
            if account.is_selfdestructed() {
                cached.destroy();
                continue;
            }
            if account.is_created() {
                cached.clear_storage();
            }
            // Touched empty accounts are removed (EIP-161)
            if account.is_empty() {
                cached.destroy();
                continue;
            }

            for (slot, value) in account.storage {
                if value.is_changed() {
                    cached.storage.insert(slot, value.present_value);
                    cached.dirty_slots.insert(slot);
                }
            }
            cached.info = Some(account.info);
            cached.dirty = true;
        }
        Ok(())
    }

    /// Apply every change to the partial trie and return the post-state root
    pub fn state_root(&mut self) -> Result<Hash> {
        let Self {
            store,
            trie,
            accounts,
            ..
        } = self;

        let mut dirty: Vec<(Nibbles, &mut CachedAccount)> = accounts
            .iter_mut()
            .filter(|(_, account)| account.dirty)
            .map(|(address, account)| (account_path(address), account))
            .collect();
        dirty.sort_by(|(a, _), (b, _)| a.cmp(b));
        debug!(accounts = dirty.len(), "updating state trie");

        for (path, account) in dirty {
            let Some(info) = &account.info else {
                mpt::delete(trie, &path, *store)?;
                account.dirty = false;
                continue;
            };

            let mut slots: Vec<(Nibbles, U256)> = account
                .dirty_slots
                .iter()
                .map(|slot| {
                    let value = account.storage.get(slot).copied().unwrap_or_default();
                    (slot_path(slot), value)
                })
                .collect();
            slots.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (key, value) in slots {
                if value.is_zero() {
                    mpt::delete(&mut account.storage_trie, &key, *store)?;
                } else {
                    account
                        .storage_trie
                        .insert(&key, alloy_rlp::encode(value).into(), *store)?;
                }
            }

            let leaf = TrieAccount {
                nonce: info.nonce,
                balance: info.balance,
                storage_root: mpt::root_hash(&account.storage_trie),
                code_hash: info.code_hash,
            };
            trie.insert(&path, alloy_rlp::encode(leaf).into(), *store)?;
            account.dirty_slots.clear();
            account.dirty = false;
        }

        Ok(mpt::root_hash(trie))
    }
}
