use log::{trace, warn};

use crate::crypto::Hash;
use crate::storage::trie::error::Result;
use crate::storage::trie::nibbles::{common_prefix_len, format_nibbles, Nibble};
use crate::storage::trie::node::Node;
use crate::storage::trie::persistence::NodePersistence;
use crate::storage::trie::splitter::{split_extension, split_leaf};

/// Insert or update traversal
///
/// Every node on the path to the key is rebuilt and persisted; untouched
/// subtrees keep their hashes.
pub struct PutOperation<'a> {
    persistence: &'a NodePersistence,
    key: &'a [Nibble],
    value: &'a [u8],
    original_key: Option<&'a [u8]>,
}

impl<'a> PutOperation<'a> {
    /// Prepare an insertion of `value` under `key`
    pub fn new(
        persistence: &'a NodePersistence,
        key: &'a [Nibble],
        value: &'a [u8],
        original_key: Option<&'a [u8]>,
    ) -> Self {
        Self { persistence, key, value, original_key }
    }

    /// Apply the insertion below `root` and return the new root hash
    pub fn apply(&self, root: Option<&Hash>) -> Result<Hash> {
        self.visit(root.copied(), 0)
    }

    fn visit(&self, hash: Option<Hash>, position: usize) -> Result<Hash> {
        let node = match hash {
            Some(h) => {
                let loaded = self.persistence.load(&h)?;
                if loaded.is_none() {
                    warn!("Node {} missing from store, replacing with a fresh leaf", hex::encode(h));
                }
                loaded
            }
            None => None,
        };

        let remaining = &self.key[position.min(self.key.len())..];
        trace!("put visiting {} at {}", node.as_ref().map_or("empty", Node::node_type), format_nibbles(remaining));

        match node {
            None => self.persistence.persist(&self.new_leaf(remaining)),

            Some(Node::Leaf { path, value, key }) => {
                let common = common_prefix_len(&path, remaining);
                if common == path.len() && common == remaining.len() {
                    let key = self.original_key.map(<[u8]>::to_vec).or(key);
                    return self.persistence.persist(&Node::leaf(path, self.value.to_vec(), key));
                }
                split_leaf(
                    self.persistence,
                    &path,
                    value,
                    key,
                    remaining,
                    self.value.to_vec(),
                    self.original_key.map(<[u8]>::to_vec),
                    common,
                )
            }

            Some(Node::Branch { mut children, value }) => {
                if remaining.is_empty() {
                    return self.persistence.persist(&Node::branch(children, Some(self.value.to_vec())));
                }
                let index = remaining[0] as usize;
                children[index] = Some(self.visit(children[index], position + 1)?);
                self.persistence.persist(&Node::branch(children, value))
            }

            Some(Node::Extension { path, child }) => {
                let common = common_prefix_len(&path, remaining);
                if common == path.len() {
                    let new_child = self.visit(Some(child), position + path.len())?;
                    return self.persistence.persist(&Node::extension(path, new_child));
                }
                split_extension(
                    self.persistence,
                    &path,
                    child,
                    remaining,
                    self.value.to_vec(),
                    self.original_key.map(<[u8]>::to_vec),
                    common,
                )
            }
        }
    }

    fn new_leaf(&self, remaining: &[Nibble]) -> Node {
        Node::leaf(remaining.to_vec(), self.value.to_vec(), self.original_key.map(<[u8]>::to_vec))
    }
}
