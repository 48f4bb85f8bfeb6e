//! Builders for the structure that appears where two paths diverge.
//!
//! Both routines create a branch holding the old and the new continuation
//! at the first differing nibble, and wrap it in an extension over the
//! shared nibbles when there are any.

use array_init::array_init;

use crate::crypto::Hash;
use crate::storage::trie::error::Result;
use crate::storage::trie::nibbles::Nibble;
use crate::storage::trie::node::{Node, BRANCH_WIDTH};
use crate::storage::trie::persistence::NodePersistence;

/// Slots of a branch under construction
struct BranchBuilder {
    children: [Option<Hash>; BRANCH_WIDTH],
    value: Option<Vec<u8>>,
}

impl BranchBuilder {
    fn new() -> Self {
        Self {
            children: array_init(|_| None),
            value: None,
        }
    }

    /// Place a fresh leaf for `remainder`, or the branch value if nothing remains
    fn place_leaf(
        &mut self,
        persistence: &NodePersistence,
        remainder: &[Nibble],
        value: Vec<u8>,
        key: Option<Vec<u8>>,
    ) -> Result<()> {
        match remainder.split_first() {
            None => self.value = Some(value),
            Some((&index, rest)) => {
                let hash = persistence.persist(&Node::leaf(rest.to_vec(), value, key))?;
                self.children[index as usize] = Some(hash);
            }
        }
        Ok(())
    }

    /// Persist the branch, wrapped in an extension over `shared` when non-empty
    fn finish(self, persistence: &NodePersistence, shared: &[Nibble]) -> Result<Hash> {
        let branch_hash = persistence.persist(&Node::branch(self.children, self.value))?;
        if shared.is_empty() {
            Ok(branch_hash)
        } else {
            persistence.persist(&Node::extension(shared.to_vec(), branch_hash))
        }
    }
}

/// Split an existing leaf against a new key at `common` shared nibbles
///
/// `remaining` is the new key from the leaf's position on. The leaf keeps
/// its original key in its shortened form.
#[allow(clippy::too_many_arguments)]
pub fn split_leaf(
    persistence: &NodePersistence,
    leaf_path: &[Nibble],
    leaf_value: Vec<u8>,
    leaf_key: Option<Vec<u8>>,
    remaining: &[Nibble],
    value: Vec<u8>,
    key: Option<Vec<u8>>,
    common: usize,
) -> Result<Hash> {
    let mut builder = BranchBuilder::new();
    builder.place_leaf(persistence, &leaf_path[common..], leaf_value, leaf_key)?;
    builder.place_leaf(persistence, &remaining[common..], value, key)?;
    builder.finish(persistence, &remaining[..common])
}

/// Split an existing extension against a new key at `common` shared nibbles
///
/// `common` is strictly shorter than the extension path. A one-nibble
/// remainder points the branch slot straight at the old child; a longer
/// one keeps a shortened extension.
pub fn split_extension(
    persistence: &NodePersistence,
    ext_path: &[Nibble],
    ext_child: Hash,
    remaining: &[Nibble],
    value: Vec<u8>,
    key: Option<Vec<u8>>,
    common: usize,
) -> Result<Hash> {
    let mut builder = BranchBuilder::new();

    if let Some((&index, rest)) = ext_path[common..].split_first() {
        let slot = if rest.is_empty() {
            ext_child
        } else {
            persistence.persist(&Node::extension(rest.to_vec(), ext_child))?
        };
        builder.children[index as usize] = Some(slot);
    }

    builder.place_leaf(persistence, &remaining[common..], value, key)?;
    builder.finish(persistence, &ext_path[..common])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv_store::MemoryStore;
    use crate::storage::trie::commitment::CommitmentScheme;
    use std::sync::Arc;

    fn persistence() -> NodePersistence {
        NodePersistence::new(Arc::new(MemoryStore::new()), CommitmentScheme::generic())
    }

    #[test]
    fn test_split_leaf_without_shared_prefix() {
        let p = persistence();
        let root = split_leaf(&p, &[1, 2], b"old".to_vec(), Some(b"k1".to_vec()), &[3, 4], b"new".to_vec(), None, 0)
            .unwrap();

        match p.load(&root).unwrap() {
            Some(Node::Branch { children, value }) => {
                assert!(value.is_none());
                let old = p.load(&children[1].unwrap()).unwrap().unwrap();
                assert_eq!(old, Node::leaf(vec![2], b"old".to_vec(), Some(b"k1".to_vec())));
                let new = p.load(&children[3].unwrap()).unwrap().unwrap();
                assert_eq!(new, Node::leaf(vec![4], b"new".to_vec(), None));
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_split_leaf_with_shared_prefix_and_branch_value() {
        let p = persistence();
        // New key ends where the paths diverge, so its value lands on the branch
        let root = split_leaf(&p, &[5, 6, 7], b"old".to_vec(), None, &[5, 6], b"new".to_vec(), None, 2).unwrap();

        let branch_hash = match p.load(&root).unwrap() {
            Some(Node::Extension { path, child }) => {
                assert_eq!(path, vec![5, 6]);
                child
            }
            other => panic!("expected extension, got {:?}", other),
        };
        match p.load(&branch_hash).unwrap() {
            Some(Node::Branch { children, value }) => {
                assert_eq!(value, Some(b"new".to_vec()));
                let old = p.load(&children[7].unwrap()).unwrap().unwrap();
                assert_eq!(old, Node::leaf(vec![], b"old".to_vec(), None));
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_split_extension_single_nibble_remainder() {
        let p = persistence();
        let child = [0x42; 32];
        let root = split_extension(&p, &[1, 2], child, &[1, 9, 9], b"v".to_vec(), None, 1).unwrap();

        let branch_hash = match p.load(&root).unwrap() {
            Some(Node::Extension { path, child }) => {
                assert_eq!(path, vec![1]);
                child
            }
            other => panic!("expected extension, got {:?}", other),
        };
        match p.load(&branch_hash).unwrap() {
            Some(Node::Branch { children, .. }) => {
                assert_eq!(children[2], Some(child));
                let leaf = p.load(&children[9].unwrap()).unwrap().unwrap();
                assert_eq!(leaf, Node::leaf(vec![9], b"v".to_vec(), None));
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_split_extension_keeps_shortened_extension() {
        let p = persistence();
        let child = [0x42; 32];
        let root = split_extension(&p, &[3, 4, 5], child, &[8, 8], b"v".to_vec(), None, 0).unwrap();

        match p.load(&root).unwrap() {
            Some(Node::Branch { children, .. }) => {
                let shortened = p.load(&children[3].unwrap()).unwrap().unwrap();
                assert_eq!(shortened, Node::extension(vec![4, 5], child));
                assert!(children[8].is_some());
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }
}
