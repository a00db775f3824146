//! Partial Merkle-Patricia tries over an untrusted node set.
//!
//! Tries are `kona-mpt` nodes that start as a single blinded root. Lookups and updates
//! pull node preimages from a [`TrieProvider`] on demand, so an incomplete witness shows
//! up as a lookup failure exactly where execution needs the missing node.

pub use alloy_trie::Nibbles;
pub use kona_mpt::{NoopTrieHinter, NoopTrieProvider, TrieNode, TrieProvider};

use crate::errors::Result;
use crate::hashing::keccak256;
use crate::types::{Bytes, Hash};
use alloc::vec::Vec;
use alloy_rlp::{BufMut, Encodable};
use alloy_trie::EMPTY_ROOT_HASH;
use kona_mpt::{ordered_trie_with_encoder, TrieNodeError};

/// Trie rooted at `root`: empty for the empty root, blinded otherwise
pub fn blinded(root: Hash) -> TrieNode {
    if root == EMPTY_ROOT_HASH {
        TrieNode::Empty
    } else {
        TrieNode::new_blinded(root)
    }
}

/// Secure-trie path of `key`
pub fn hashed_path(key: &[u8]) -> Nibbles {
    Nibbles::unpack(keccak256(key))
}

/// Root commitment of `trie`, hashing an open root on demand
pub fn root_hash(trie: &TrieNode) -> Hash {
    match trie.blinded_commitment() {
        Some(commitment) => commitment,
        None => keccak256(&alloy_rlp::encode(trie)),
    }
}

/// Remove `path` from `trie`; a key that is not there is left alone
pub fn delete<P: TrieProvider>(trie: &mut TrieNode, path: &Nibbles, provider: &P) -> Result<()> {
    match trie.delete(path, provider, &NoopTrieHinter) {
        Ok(()) | Err(TrieNodeError::KeyNotFound) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Encodings of the root and every hash-referenced node of an open trie
pub fn encoded_nodes(trie: &TrieNode) -> Vec<Bytes> {
    let mut nodes = Vec::new();
    if !matches!(trie, TrieNode::Empty | TrieNode::Blinded { .. }) {
        collect_referenced(trie, &mut nodes);
        nodes.push(alloy_rlp::encode(trie).into());
    }
    nodes
}

fn collect_referenced(node: &TrieNode, out: &mut Vec<Bytes>) {
    let children = match node {
        TrieNode::Branch { stack } => stack.as_slice(),
        TrieNode::Extension { node, .. } => core::slice::from_ref(node.as_ref()),
        _ => return,
    };
    for child in children {
        collect_referenced(child, out);
        // Shorter children are inlined into their parent
        if child.blinded_commitment().is_none() && child.length() >= Hash::len_bytes() {
            out.push(alloy_rlp::encode(child).into());
        }
    }
}

/// Root of the trie mapping `rlp(index)` to each encoded item, as used for the
/// transactions, receipts and withdrawals roots
pub fn ordered_trie_root<T, F>(items: &[T], encode: F) -> Hash
where
    F: FnMut(&T, &mut dyn BufMut),
{
    ordered_trie_with_encoder(items, encode).root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::store::WitnessStore;
    use alloc::collections::BTreeMap;
    use alloy_trie::HashBuilder;

    fn leaves(count: u8) -> BTreeMap<Nibbles, Bytes> {
        (0..count)
            .map(|i| (hashed_path(&[i]), Bytes::from(vec![i; 1 + i as usize % 40])))
            .collect()
    }

    fn build(leaves: &BTreeMap<Nibbles, Bytes>) -> TrieNode {
        let mut trie = TrieNode::Empty;
        for (path, value) in leaves {
            trie.insert(path, value.clone(), &NoopTrieProvider).unwrap();
        }
        trie
    }

    fn reference_root(leaves: &BTreeMap<Nibbles, Bytes>) -> Hash {
        let mut builder = HashBuilder::default();
        for (path, value) in leaves {
            builder.add_leaf(path.clone(), value);
        }
        builder.root()
    }

    #[test]
    fn test_empty_root() {
        assert_eq!(root_hash(&TrieNode::Empty), EMPTY_ROOT_HASH);
        assert!(encoded_nodes(&TrieNode::Empty).is_empty());
        assert!(matches!(blinded(EMPTY_ROOT_HASH), TrieNode::Empty));
    }

    #[test]
    fn test_root_matches_hash_builder() {
        let leaves = leaves(50);
        assert_eq!(root_hash(&build(&leaves)), reference_root(&leaves));

        // A lone leaf as the root
        let single: BTreeMap<Nibbles, Bytes> =
            leaves.iter().take(1).map(|(k, v)| (k.clone(), v.clone())).collect();
        assert_eq!(root_hash(&build(&single)), reference_root(&single));
    }

    #[test]
    fn test_delete_collapses_branches() {
        let mut all = leaves(20);
        let mut trie = build(&all);
        for i in (0..20u8).step_by(3) {
            let path = hashed_path(&[i]);
            delete(&mut trie, &path, &NoopTrieProvider).unwrap();
            all.remove(&path);
        }
        assert_eq!(root_hash(&trie), reference_root(&all));

        // Deleting an absent key changes nothing
        delete(&mut trie, &hashed_path(b"absent"), &NoopTrieProvider).unwrap();
        assert_eq!(root_hash(&trie), reference_root(&all));
    }

    #[test]
    fn test_reopen_from_encoded_nodes() {
        let leaves = leaves(30);
        let trie = build(&leaves);
        let root = root_hash(&trie);

        let mut store = WitnessStore::new();
        store.load_state(&encoded_nodes(&trie));

        let mut reopened = blinded(root);
        for (path, value) in &leaves {
            let found = reopened.open(path, &store).unwrap().map(|bytes| bytes.to_vec());
            assert_eq!(found, Some(value.to_vec()));
        }
        assert!(reopened.open(&hashed_path(b"absent"), &store).unwrap().is_none());
        assert_eq!(root_hash(&reopened), root);
    }

    #[test]
    fn test_missing_node_is_insufficient_witness() {
        let leaves = leaves(30);
        let trie = build(&leaves);
        let root = root_hash(&trie);

        // Only the root: every lookup below it needs a node that is not there
        let mut store = WitnessStore::new();
        let nodes = encoded_nodes(&trie);
        store.load_state(&nodes[nodes.len() - 1..]);

        let mut reopened = blinded(root);
        let (path, _) = leaves.iter().next().unwrap();
        let err: crate::errors::WitnessEvmError = reopened.open(path, &store).unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InsufficientWitness);
        assert!(err.to_string().contains("missing trie node"));
    }

    #[test]
    fn test_ordered_trie_root() {
        let empty: [Bytes; 0] = [];
        assert_eq!(ordered_trie_root(&empty, |item, buf| item.encode(buf)), EMPTY_ROOT_HASH);

        // Crosses the single-byte / two-byte index boundary at 128
        let items: Vec<Bytes> =
            (0..200u64).map(|i| Bytes::from(vec![0xab; 1 + (i % 50) as usize])).collect();
        let mut sorted = BTreeMap::new();
        for (i, item) in items.iter().enumerate() {
            sorted.insert(Nibbles::unpack(alloy_rlp::encode(i as u64)), item.clone());
        }
        let mut builder = HashBuilder::default();
        for (key, item) in &sorted {
            builder.add_leaf(key.clone(), item);
        }

        assert_eq!(
            ordered_trie_root(&items, |item, buf| buf.put_slice(item)),
            builder.root()
        );
    }
}
