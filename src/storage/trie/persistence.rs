use std::sync::Arc;

use log::trace;

use crate::crypto::Hash;
use crate::storage::kv_store::NodeStore;
use crate::storage::trie::commitment::CommitmentScheme;
use crate::storage::trie::error::Result;
use crate::storage::trie::nibbles::format_nibbles;
use crate::storage::trie::node::Node;

/// Content-addressed node storage on top of a `NodeStore`
///
/// Nodes are keyed by their commitment under the active scheme. Writes are
/// idempotent and nothing is ever removed, so older roots stay readable.
#[derive(Clone)]
pub struct NodePersistence {
    store: Arc<dyn NodeStore>,
    commitments: CommitmentScheme,
}

impl NodePersistence {
    /// Create a persistence layer over a store
    pub fn new(store: Arc<dyn NodeStore>, commitments: CommitmentScheme) -> Self {
        Self { store, commitments }
    }

    /// Active commitment scheme
    pub fn commitments(&self) -> &CommitmentScheme {
        &self.commitments
    }

    /// Compute a node's commitment
    ///
    /// Extensions flatten into their child: the extension path becomes the
    /// prefix of the branch or leaf below it.
    pub fn commit(&self, node: &Node) -> Result<Hash> {
        let scheme = &self.commitments;
        match node {
            Node::Branch { children, value } => {
                let value_hash = value.as_ref().map(|v| scheme.digest(v));
                Ok(scheme.commit_branch(&[], children, value_hash.as_ref()))
            }
            Node::Leaf { path, value, .. } => Ok(scheme.commit_leaf(path, &scheme.digest(value))),
            Node::Extension { path, child } => self.extension_commit(path, child),
        }
    }

    fn extension_commit(&self, path: &[u8], child: &Hash) -> Result<Hash> {
        let scheme = &self.commitments;
        let mut prefix = path.to_vec();
        let mut current = *child;

        loop {
            match self.load(&current)? {
                Some(Node::Extension { path, child }) => {
                    prefix.extend_from_slice(&path);
                    current = child;
                }
                Some(Node::Branch { children, value }) => {
                    let value_hash = value.as_ref().map(|v| scheme.digest(v));
                    return Ok(scheme.commit_branch(&prefix, &children, value_hash.as_ref()));
                }
                Some(Node::Leaf { path, value, .. }) => {
                    prefix.extend_from_slice(&path);
                    return Ok(scheme.commit_leaf(&prefix, &scheme.digest(&value)));
                }
                None => return Ok(scheme.commit_extension(&prefix, &current)),
            }
        }
    }

    /// Store a node under its commitment and return the commitment
    pub fn persist(&self, node: &Node) -> Result<Hash> {
        let hash = self.commit(node)?;
        let encoded = node.encode()?;
        self.store.put(&hash, &encoded)?;

        match node {
            Node::Branch { .. } => trace!("Persisted branch {} ({} children)", hex::encode(hash), node.child_count()),
            Node::Leaf { path, .. } | Node::Extension { path, .. } => {
                trace!("Persisted {} {} path {}", node.node_type(), hex::encode(hash), format_nibbles(path))
            }
        }
        Ok(hash)
    }

    /// Load a node by commitment; `None` when the store has no such node
    pub fn load(&self, hash: &Hash) -> Result<Option<Node>> {
        match self.store.get(hash)? {
            Some(bytes) => Ok(Some(Node::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether a node with this commitment is stored
    pub fn exists(&self, hash: &Hash) -> Result<bool> {
        Ok(self.store.exists(hash)?)
    }
}
