use log::trace;

use crate::crypto::Hash;
use crate::storage::trie::error::Result;
use crate::storage::trie::nibbles::{common_prefix_len, Nibble};
use crate::storage::trie::node::{Node, BRANCH_WIDTH};
use crate::storage::trie::persistence::NodePersistence;

/// One node crossed while walking towards a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalStep {
    /// A branch, entered through `skip` nibbles of extension path
    Branch {
        /// Extension nibbles consumed since the previous step
        skip: Vec<Nibble>,
        /// All 16 child slots of the branch
        children: [Option<Hash>; BRANCH_WIDTH],
        /// Slot taken, `None` when the key ends at this branch
        index: Option<Nibble>,
        /// Hash of the branch value, only when the mode commits branch values
        value_hash: Option<Hash>,
    },

    /// An extension diverging from the key
    Fork {
        /// Pending nibbles plus the matched part of the extension path
        skip: Vec<Nibble>,
        /// First extension nibble differing from the key
        nibble: Nibble,
        /// Extension nibbles after the diverging one
        suffix: Vec<Nibble>,
        /// 16-way Merkle root of the branch under the extension
        root: Hash,
    },
}

impl TraversalStep {
    /// Number of skipped nibbles
    pub fn skip_len(&self) -> usize {
        match self {
            TraversalStep::Branch { skip, .. } | TraversalStep::Fork { skip, .. } => skip.len(),
        }
    }
}

/// How the walk ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofOutcome {
    /// The key is present
    Inclusion {
        /// Leaf suffix matching the rest of the key
        suffix: Vec<Nibble>,
        /// Hash of the stored value
        value_hash: Hash,
    },
    /// The walk fell off the trie: empty slot, missing node, empty trie or a fork
    MissingBranch,
    /// A leaf for a different key occupies the slot
    DifferentLeaf {
        /// Full nibble path of the conflicting leaf
        path: Vec<Nibble>,
        /// Hash of the conflicting leaf's value
        value_hash: Hash,
        /// Suffix stored in the conflicting leaf
        suffix: Vec<Nibble>,
    },
}

/// Steps and outcome of a walk from the root towards a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalProof {
    /// Steps in root-to-leaf order
    pub steps: Vec<TraversalStep>,
    /// Terminal result
    pub outcome: ProofOutcome,
}

impl TraversalProof {
    fn missing(steps: Vec<TraversalStep>) -> Self {
        Self { steps, outcome: ProofOutcome::MissingBranch }
    }

    /// Whether the proof shows the key present
    pub fn is_inclusion(&self) -> bool {
        matches!(self.outcome, ProofOutcome::Inclusion { .. })
    }
}

/// Walks from a root towards a key and records what a verifier needs
pub struct ProofGenerator<'a> {
    persistence: &'a NodePersistence,
    key: &'a [Nibble],
}

impl<'a> ProofGenerator<'a> {
    /// Prepare a proof for `key`
    pub fn new(persistence: &'a NodePersistence, key: &'a [Nibble]) -> Self {
        Self { persistence, key }
    }

    /// Build the traversal proof below `root`
    pub fn generate(&self, root: Option<&Hash>) -> Result<TraversalProof> {
        let scheme = self.persistence.commitments();
        let mut steps = Vec::new();
        let mut pending: Vec<Nibble> = Vec::new();
        let mut depth = 0;

        let mut current = match root {
            Some(hash) => *hash,
            None => return Ok(TraversalProof::missing(steps)),
        };

        loop {
            let node = match self.persistence.load(&current)? {
                Some(node) => node,
                None => return Ok(TraversalProof::missing(steps)),
            };
            trace!("proof step {} at depth {}", node.node_type(), depth);

            match node {
                Node::Branch { children, value } => {
                    let value_hash = match &value {
                        Some(v) if scheme.mode().encodes_branch_value() => Some(scheme.digest(v)),
                        _ => None,
                    };
                    let index = self.key.get(depth).copied();
                    steps.push(TraversalStep::Branch {
                        skip: std::mem::take(&mut pending),
                        children,
                        index,
                        value_hash,
                    });

                    let index = match index {
                        Some(index) => index,
                        None => {
                            return Ok(match value {
                                Some(v) => TraversalProof {
                                    steps,
                                    outcome: ProofOutcome::Inclusion {
                                        suffix: Vec::new(),
                                        value_hash: scheme.digest(&v),
                                    },
                                },
                                None => TraversalProof::missing(steps),
                            });
                        }
                    };

                    match children[index as usize] {
                        Some(child) => {
                            current = child;
                            depth += 1;
                        }
                        None => return Ok(TraversalProof::missing(steps)),
                    }
                }

                Node::Extension { path, child } => {
                    let remaining = &self.key[depth..];
                    let matched = common_prefix_len(&path, remaining);

                    if matched == path.len() {
                        pending.extend_from_slice(&path);
                        depth += path.len();
                        current = child;
                        continue;
                    }

                    let root = match self.persistence.load(&child)? {
                        Some(Node::Branch { children, value }) => {
                            let value_hash = value.as_ref().map(|v| scheme.digest(v));
                            scheme.branch_root(&children, value_hash.as_ref())
                        }
                        _ => return Ok(TraversalProof::missing(steps)),
                    };

                    let mut skip = std::mem::take(&mut pending);
                    skip.extend_from_slice(&path[..matched]);
                    steps.push(TraversalStep::Fork {
                        skip,
                        nibble: path[matched],
                        suffix: path[matched + 1..].to_vec(),
                        root,
                    });
                    return Ok(TraversalProof::missing(steps));
                }

                Node::Leaf { path, value, .. } => {
                    let remaining = &self.key[depth..];
                    let value_hash = scheme.digest(&value);

                    let outcome = if path == remaining {
                        ProofOutcome::Inclusion { suffix: path, value_hash }
                    } else {
                        let mut full = self.key[..depth].to_vec();
                        full.extend_from_slice(&path);
                        ProofOutcome::DifferentLeaf { path: full, value_hash, suffix: path }
                    };
                    return Ok(TraversalProof { steps, outcome });
                }
            }
        }
    }
}
