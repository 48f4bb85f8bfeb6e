use log::trace;

use crate::crypto::Hash;
use crate::storage::trie::error::Result;
use crate::storage::trie::nibbles::Nibble;
use crate::storage::trie::node::Node;
use crate::storage::trie::persistence::NodePersistence;

/// Lookup traversal
pub struct GetOperation<'a> {
    persistence: &'a NodePersistence,
    key: &'a [Nibble],
}

impl<'a> GetOperation<'a> {
    /// Prepare a lookup of `key`
    pub fn new(persistence: &'a NodePersistence, key: &'a [Nibble]) -> Self {
        Self { persistence, key }
    }

    /// Value stored under the key below `root`, if any
    pub fn apply(&self, root: Option<&Hash>) -> Result<Option<Vec<u8>>> {
        let mut current = match root {
            Some(hash) => *hash,
            None => return Ok(None),
        };
        let mut position = 0;

        loop {
            let node = match self.persistence.load(&current)? {
                Some(node) => node,
                None => {
                    trace!("get hit missing node {}", hex::encode(current));
                    return Ok(None);
                }
            };
            let remaining = &self.key[position..];

            match node {
                Node::Leaf { path, value, .. } => {
                    return Ok(if path == remaining { Some(value) } else { None });
                }
                Node::Branch { children, value } => {
                    if remaining.is_empty() {
                        return Ok(value);
                    }
                    match children[remaining[0] as usize] {
                        Some(child) => {
                            current = child;
                            position += 1;
                        }
                        None => return Ok(None),
                    }
                }
                Node::Extension { path, child } => {
                    if !remaining.starts_with(&path) {
                        return Ok(None);
                    }
                    current = child;
                    position += path.len();
                }
            }
        }
    }
}
