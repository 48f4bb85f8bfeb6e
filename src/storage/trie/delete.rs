use log::trace;

use crate::crypto::Hash;
use crate::storage::trie::error::Result;
use crate::storage::trie::nibbles::{format_nibbles, Nibble};
use crate::storage::trie::node::{Node, BRANCH_WIDTH};
use crate::storage::trie::persistence::NodePersistence;

/// Removal traversal with path compression
///
/// Returns `None` when the subtree disappears. Subtrees that do not contain
/// the key come back with their original hash.
pub struct DeleteOperation<'a> {
    persistence: &'a NodePersistence,
    key: &'a [Nibble],
}

impl<'a> DeleteOperation<'a> {
    /// Prepare a removal of `key`
    pub fn new(persistence: &'a NodePersistence, key: &'a [Nibble]) -> Self {
        Self { persistence, key }
    }

    /// Apply the removal below `root`
    pub fn apply(&self, root: Option<&Hash>) -> Result<Option<Hash>> {
        match root {
            Some(hash) => self.visit(*hash, 0),
            None => Ok(None),
        }
    }

    fn visit(&self, hash: Hash, position: usize) -> Result<Option<Hash>> {
        let node = match self.persistence.load(&hash)? {
            Some(node) => node,
            None => {
                trace!("delete reached missing node {}", hex::encode(hash));
                return Ok(Some(hash));
            }
        };
        let remaining = &self.key[position.min(self.key.len())..];

        match node {
            Node::Leaf { path, .. } => {
                if path == remaining {
                    trace!("delete removed leaf {}", format_nibbles(&path));
                    Ok(None)
                } else {
                    Ok(Some(hash))
                }
            }

            Node::Branch { mut children, value } => {
                if remaining.is_empty() {
                    if value.is_none() {
                        return Ok(Some(hash));
                    }
                    return self.compress_branch(children, None);
                }

                let index = remaining[0] as usize;
                let child = match children[index] {
                    Some(child) => child,
                    None => return Ok(Some(hash)),
                };
                let updated = self.visit(child, position + 1)?;
                if updated == Some(child) {
                    return Ok(Some(hash));
                }
                children[index] = updated;
                self.compress_branch(children, value)
            }

            Node::Extension { path, child } => {
                if !remaining.starts_with(&path) {
                    return Ok(Some(hash));
                }
                let updated = match self.visit(child, position + path.len())? {
                    Some(updated) => updated,
                    None => return Ok(None),
                };
                if updated == child {
                    return Ok(Some(hash));
                }
                self.merge_extension(path, updated).map(Some)
            }
        }
    }

    /// Re-establish the compressed form of a branch after one slot changed
    fn compress_branch(&self, children: [Option<Hash>; BRANCH_WIDTH], value: Option<Vec<u8>>) -> Result<Option<Hash>> {
        let branch = Node::branch(children, value);

        match (branch.child_count(), branch.first_child()) {
            (0, _) => match branch {
                Node::Branch { value: Some(value), .. } => {
                    // Branch nodes never carry an original key, so none is lost here
                    self.persistence.persist(&Node::leaf(Vec::new(), value, None)).map(Some)
                }
                _ => Ok(None),
            },
            (1, Some((index, child))) if branch.value().is_none() => {
                let nibble = index as Nibble;
                match self.persistence.load(&child)? {
                    Some(Node::Extension { path, child: grandchild }) => {
                        let merged = prepend(nibble, &path);
                        self.persistence.persist(&Node::extension(merged, grandchild)).map(Some)
                    }
                    Some(Node::Leaf { path, value, key }) => {
                        let merged = prepend(nibble, &path);
                        self.persistence.persist(&Node::leaf(merged, value, key)).map(Some)
                    }
                    Some(Node::Branch { .. }) => {
                        self.persistence.persist(&Node::extension(vec![nibble], child)).map(Some)
                    }
                    None => self.persistence.persist(&branch).map(Some),
                }
            }
            _ => self.persistence.persist(&branch).map(Some),
        }
    }

    /// Rebuild an extension over a changed child, absorbing extension and leaf children
    fn merge_extension(&self, path: Vec<Nibble>, child: Hash) -> Result<Hash> {
        match self.persistence.load(&child)? {
            Some(Node::Extension { path: tail, child: grandchild }) => {
                self.persistence.persist(&Node::extension([path, tail].concat(), grandchild))
            }
            Some(Node::Leaf { path: tail, value, key }) => {
                self.persistence.persist(&Node::leaf([path, tail].concat(), value, key))
            }
            Some(Node::Branch { .. }) | None => self.persistence.persist(&Node::extension(path, child)),
        }
    }
}

fn prepend(nibble: Nibble, path: &[Nibble]) -> Vec<Nibble> {
    let mut merged = Vec::with_capacity(path.len() + 1);
    merged.push(nibble);
    merged.extend_from_slice(path);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv_store::MemoryStore;
    use crate::storage::trie::commitment::CommitmentScheme;
    use crate::storage::trie::get::GetOperation;
    use crate::storage::trie::put::PutOperation;
    use std::sync::Arc;

    fn persistence() -> NodePersistence {
        NodePersistence::new(Arc::new(MemoryStore::new()), CommitmentScheme::generic())
    }

    fn put(p: &NodePersistence, root: Option<Hash>, key: &[Nibble], value: &[u8]) -> Hash {
        PutOperation::new(p, key, value, None).apply(root.as_ref()).unwrap()
    }

    fn delete(p: &NodePersistence, root: Hash, key: &[Nibble]) -> Option<Hash> {
        DeleteOperation::new(p, key).apply(Some(&root)).unwrap()
    }

    #[test]
    fn test_delete_only_leaf() {
        let p = persistence();
        let root = put(&p, None, &[1, 2], b"a");
        assert_eq!(delete(&p, root, &[1, 2]), None);
        assert_eq!(DeleteOperation::new(&p, &[1]).apply(None).unwrap(), None);
    }

    #[test]
    fn test_delete_missing_key_keeps_root() {
        let p = persistence();
        let mut root = put(&p, None, &[1, 2, 3], b"a");
        root = put(&p, Some(root), &[1, 2, 4], b"b");
        root = put(&p, Some(root), &[5], b"c");

        assert_eq!(delete(&p, root, &[1, 2, 5]), Some(root));
        assert_eq!(delete(&p, root, &[1, 3]), Some(root));
        assert_eq!(delete(&p, root, &[7]), Some(root));
        assert_eq!(delete(&p, root, &[]), Some(root));
    }

    #[test]
    fn test_delete_restores_compressed_shape() {
        let p = persistence();
        let single = put(&p, None, &[1, 2, 3], b"a");
        let both = put(&p, Some(single), &[1, 2, 4], b"b");
        assert_ne!(single, both);

        // Removing the sibling collapses extension and branch back into one leaf
        let after = delete(&p, both, &[1, 2, 4]).unwrap();
        assert_eq!(after, single);
        assert_eq!(
            p.load(&after).unwrap(),
            Some(Node::leaf(vec![1, 2, 3], b"a".to_vec(), None))
        );
    }

    #[test]
    fn test_delete_merges_extensions() {
        let p = persistence();
        let base = put(&p, None, &[1, 2, 3, 4], b"a");
        let base = put(&p, Some(base), &[1, 2, 3, 5], b"b");
        let with_fork = put(&p, Some(base), &[1, 9], b"c");

        // Ext[1] -> Branch{2: Ext[3] -> Branch{4, 5}, 9: Leaf}
        let after = delete(&p, with_fork, &[1, 9]).unwrap();
        assert_eq!(after, base);
        match p.load(&after).unwrap() {
            Some(Node::Extension { path, .. }) => assert_eq!(path, vec![1, 2, 3]),
            other => panic!("expected extension, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_branch_value() {
        let p = persistence();
        let base = put(&p, None, &[1, 2, 3], b"a");
        let base = put(&p, Some(base), &[1, 2, 4], b"b");
        let with_value = put(&p, Some(base), &[1, 2], b"v");

        let after = delete(&p, with_value, &[1, 2]).unwrap();
        assert_eq!(after, base);
        assert_eq!(GetOperation::new(&p, &[1, 2]).apply(Some(&after)).unwrap(), None);
    }

    #[test]
    fn test_delete_leaves_value_only_branch_as_leaf() {
        let p = persistence();
        let root = put(&p, None, &[1, 2], b"v");
        let root = put(&p, Some(root), &[1, 2, 3], b"a");

        let after = delete(&p, root, &[1, 2, 3]).unwrap();
        assert_eq!(after, put(&p, None, &[1, 2], b"v"));
        assert_eq!(GetOperation::new(&p, &[1, 2]).apply(Some(&after)).unwrap(), Some(b"v".to_vec()));
    }
}
