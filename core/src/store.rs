//! Ephemeral witness store
//!
//! Content-addressed mapping from hashes to witness blobs, built fresh for each validation.
//! Loading is blind: nothing is decoded or checked until execution asks for it.

use crate::block::Header;
use crate::errors::{Result, WitnessEntry, WitnessEvmError};
use crate::hashing::keccak256;
use crate::input::Witness;
use crate::mpt::{TrieNode, TrieProvider};
use crate::types::{BlockNumber, Bytes, Hash};
use alloc::collections::BTreeMap;
use alloy_rlp::Decodable;
use tracing::debug;

/// Key-value store over one witness
#[derive(Debug, Clone, Default)]
pub struct WitnessStore {
    nodes: BTreeMap<Hash, Bytes>,
    codes: BTreeMap<Hash, Bytes>,
    headers: BTreeMap<Hash, Header>,
    canonical: BTreeMap<BlockNumber, Hash>,
}

impl WitnessStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store and index every part of `witness`
    pub fn from_witness(witness: &Witness) -> Self {
        let mut store = Self::new();
        store.load_ancestors(&witness.ancestors);
        store.load_codes(&witness.codes);
        store.load_state(&witness.state);
        debug!(
            headers = store.headers.len(),
            codes = store.codes.len(),
            nodes = store.nodes.len(),
            "witness store assembled"
        );
        store
    }

    /// Index headers by hash and by number
    pub fn load_ancestors(&mut self, headers: &[Header]) {
        for header in headers {
            let hash = header.hash_slow();
            self.canonical.insert(header.number, hash);
            self.headers.insert(hash, header.clone());
        }
    }

    /// Store code blobs under their hash
    pub fn load_codes(&mut self, codes: &[Bytes]) {
        for code in codes {
            self.codes.insert(keccak256(code), code.clone());
        }
    }

    /// Store raw trie nodes under their hash
    pub fn load_state(&mut self, nodes: &[Bytes]) {
        for node in nodes {
            self.nodes.insert(keccak256(node), node.clone());
        }
    }

    pub fn contains_node(&self, hash: &Hash) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Contract code by hash
    pub fn code(&self, hash: Hash) -> Result<&Bytes> {
        self.codes.get(&hash).ok_or(WitnessEvmError::InsufficientWitness {
            entry: WitnessEntry::Code,
            hash,
        })
    }

    pub fn header_by_hash(&self, hash: Hash) -> Option<&Header> {
        self.headers.get(&hash)
    }

    pub fn header_by_number(&self, number: BlockNumber) -> Option<&Header> {
        self.canonical
            .get(&number)
            .and_then(|hash| self.headers.get(hash))
    }
}

impl TrieProvider for WitnessStore {
    type Error = WitnessEvmError;

    fn trie_node_by_hash(&self, hash: Hash) -> Result<TrieNode> {
        let blob = self
            .nodes
            .get(&hash)
            .ok_or_else(|| WitnessEvmError::missing_node(hash))?;
        TrieNode::decode(&mut blob.as_ref()).map_err(WitnessEvmError::invalid_witness)
    }
}
