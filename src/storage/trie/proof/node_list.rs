use ciborium::value::Value;
use log::{debug, warn};

use crate::crypto::Hash;
use crate::storage::trie::commitment::CommitmentScheme;
use crate::storage::trie::error::{Result, TrieError};
use crate::storage::trie::nibbles::Nibble;
use crate::storage::trie::node::Node;
use crate::storage::trie::persistence::NodePersistence;

/// Proof made of the encoded nodes met on the way from the root to a key
///
/// This is the proof format of `Mode::Generic`. Keys may end at a branch,
/// inside an extension or before a leaf, none of which the fixed-depth step
/// format can express. The verifier rebuilds each node's commitment from its
/// encoding, so branch values are checked directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeListProof {
    pub nodes: Vec<Node>,
}

impl NodeListProof {
    /// Collect the nodes on the path to `key`
    ///
    /// An extension that leaves the key is followed by its child, which the
    /// verifier needs to recompute the extension's flattened commitment.
    pub fn generate(persistence: &NodePersistence, key: &[Nibble], root: Option<&Hash>) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut current = match root {
            Some(hash) => *hash,
            None => return Ok(Self { nodes }),
        };
        let mut pos = 0;

        loop {
            let node = match persistence.load(&current)? {
                Some(node) => node,
                None => {
                    warn!("Node {} missing while proving", hex::encode(current));
                    break;
                }
            };

            let (next, diverged) = match &node {
                Node::Branch { children, .. } if pos < key.len() => {
                    let child = children[key[pos] as usize];
                    pos += 1;
                    (child, None)
                }
                Node::Branch { .. } | Node::Leaf { .. } => (None, None),
                Node::Extension { path, child } => {
                    if key[pos..].starts_with(path) {
                        pos += path.len();
                        (Some(*child), None)
                    } else {
                        (None, Some(*child))
                    }
                }
            };
            nodes.push(node);

            if let Some(child) = diverged {
                if let Some(below) = persistence.load(&child)? {
                    nodes.push(below);
                }
                break;
            }
            match next {
                Some(hash) => current = hash,
                None => break,
            }
        }

        Ok(Self { nodes })
    }

    /// Encode as a CBOR array of encoded nodes
    pub fn encode(&self) -> Result<Vec<u8>> {
        let items = self
            .nodes
            .iter()
            .map(|node| node.encode().map(Value::Bytes))
            .collect::<Result<Vec<_>>>()?;
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&Value::Array(items), &mut buf)
            .map_err(|e| TrieError::Encode(format!("Failed to encode proof: {:?}", e)))?;
        Ok(buf)
    }

    /// Decode a CBOR node-list proof
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| TrieError::Decode(format!("Invalid proof CBOR: {:?}", e)))?;
        let items = match value {
            Value::Array(items) => items,
            other => return Err(TrieError::Decode(format!("Proof is not an array: {:?}", other))),
        };
        let nodes = items
            .into_iter()
            .map(|item| match item {
                Value::Bytes(bytes) => Node::decode(&bytes),
                other => Err(TrieError::Decode(format!("Proof node is not a byte string: {:?}", other))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { nodes })
    }

    /// Whether the proof shows `value` (or absence) under `path` for `expected_root`
    pub fn verify(
        &self,
        commitments: &CommitmentScheme,
        expected_root: Option<&Hash>,
        path: &[Nibble],
        value: Option<&[u8]>,
        including: bool,
    ) -> bool {
        match self.stored_value(commitments, expected_root, path) {
            Ok(found) => match (including, value) {
                (true, Some(expected)) => found.as_deref() == Some(expected),
                (true, None) => false,
                (false, _) => found.is_none(),
            },
            Err(e) => {
                debug!("Proof rejected: {}", e);
                false
            }
        }
    }

    /// Value the proof shows under `path`, after linking every node to `expected_root`
    pub fn stored_value(
        &self,
        commitments: &CommitmentScheme,
        expected_root: Option<&Hash>,
        path: &[Nibble],
    ) -> Result<Option<Vec<u8>>> {
        let root = match (expected_root, self.nodes.is_empty()) {
            (None, true) => return Ok(None),
            (Some(root), false) => root,
            (None, false) => return Err(TrieError::InvalidProof("nodes given for an empty trie".to_string())),
            (Some(_), true) => return Err(TrieError::InvalidProof("no nodes for a non-empty trie".to_string())),
        };
        if self.flatten(commitments, 0)? != *root {
            return Err(TrieError::InvalidProof("first node does not match the root".to_string()));
        }

        let mut idx = 0;
        let mut pos = 0;
        loop {
            match &self.nodes[idx] {
                Node::Branch { children, value } => {
                    if pos == path.len() {
                        return Ok(value.clone());
                    }
                    let slot = match children[path[pos] as usize] {
                        Some(hash) => hash,
                        None => return Ok(None),
                    };
                    self.link(commitments, idx + 1, &slot)?;
                    idx += 1;
                    pos += 1;
                }
                Node::Extension { path: ext, child } => {
                    self.link(commitments, idx + 1, child)?;
                    if !path[pos..].starts_with(ext) {
                        return Ok(None);
                    }
                    idx += 1;
                    pos += ext.len();
                }
                Node::Leaf { path: suffix, value, .. } => {
                    return Ok(if path[pos..] == suffix[..] { Some(value.clone()) } else { None });
                }
            }
        }
    }

    /// Check that the node at `idx` hashes to what its parent references
    fn link(&self, commitments: &CommitmentScheme, idx: usize, expected: &Hash) -> Result<()> {
        if idx >= self.nodes.len() {
            return Err(TrieError::InvalidProof(format!("proof ends after {} nodes", self.nodes.len())));
        }
        if self.flatten(commitments, idx)? != *expected {
            return Err(TrieError::InvalidProof(format!("node {} does not match its parent", idx)));
        }
        Ok(())
    }

    /// Commitment of the node at `idx`, with an extension flattened into the node after it
    fn flatten(&self, commitments: &CommitmentScheme, idx: usize) -> Result<Hash> {
        let scheme = commitments;
        match &self.nodes[idx] {
            Node::Branch { children, value } => {
                let value_hash = value.as_ref().map(|v| scheme.digest(v));
                Ok(scheme.commit_branch(&[], children, value_hash.as_ref()))
            }
            Node::Leaf { path, value, .. } => Ok(scheme.commit_leaf(path, &scheme.digest(value))),
            Node::Extension { path, child } => match self.nodes.get(idx + 1) {
                Some(Node::Branch { children, value }) => {
                    let value_hash = value.as_ref().map(|v| scheme.digest(v));
                    Ok(scheme.commit_branch(path, children, value_hash.as_ref()))
                }
                Some(Node::Leaf { path: suffix, value, .. }) => {
                    let full = [&path[..], &suffix[..]].concat();
                    Ok(scheme.commit_leaf(&full, &scheme.digest(value)))
                }
                Some(Node::Extension { .. }) => Err(TrieError::InvalidProof("extension follows an extension".to_string())),
                None => Ok(scheme.commit_extension(path, child)),
            },
        }
    }
}
