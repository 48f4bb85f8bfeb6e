use log::debug;

use crate::crypto::Hash;
use crate::storage::trie::commitment::{CommitmentScheme, NULL_HASH};
use crate::storage::trie::error::{Result, TrieError};
use crate::storage::trie::nibbles::{bytes_to_nibbles, Nibble};
use crate::storage::trie::node::BRANCH_WIDTH;
use crate::storage::trie::proof::wire::{WireProof, WireStep, NEIGHBOR_COUNT};

/// Recomputes a root hash from a wire proof
///
/// Pure with respect to storage: only the commitment scheme is used.
pub struct ProofVerifier<'a> {
    commitments: &'a CommitmentScheme,
    path: &'a [Nibble],
    value_hash: Option<Hash>,
    including: bool,
}

impl<'a> ProofVerifier<'a> {
    /// Prepare a verifier for `path`; `value` is required when proving inclusion
    pub fn new(commitments: &'a CommitmentScheme, path: &'a [Nibble], value: Option<&[u8]>, including: bool) -> Self {
        Self {
            commitments,
            path,
            value_hash: value.map(|v| commitments.digest(v)),
            including,
        }
    }

    /// Root implied by the proof, `None` for an empty trie
    pub fn compute_root(&self, proof: &WireProof) -> Result<Option<Hash>> {
        if self.including && self.value_hash.is_none() {
            return Err(TrieError::InvalidArgument("inclusion proof needs a value".to_string()));
        }
        if proof.is_empty() {
            return Ok(match self.value_hash {
                Some(vh) if self.including => Some(self.commitments.commit_leaf(self.path, &vh)),
                _ => None,
            });
        }
        self.walk(&proof.steps, 0).map(Some)
    }

    /// Whether the proof recomputes to `expected_root`
    pub fn verify(&self, expected_root: Option<&Hash>, proof: &WireProof) -> bool {
        match self.compute_root(proof) {
            Ok(computed) => computed.unwrap_or(NULL_HASH) == expected_root.copied().unwrap_or(NULL_HASH),
            Err(e) => {
                debug!("Proof rejected: {}", e);
                false
            }
        }
    }

    fn walk(&self, steps: &[WireStep], cursor: usize) -> Result<Hash> {
        let (step, rest) = match steps.split_first() {
            Some(split) => split,
            None => return self.terminal(cursor),
        };

        let next = cursor + 1 + step.skip();
        if next > self.path.len() {
            return Err(TrieError::InvalidProof(format!("step skips past the key end at {}", next)));
        }
        let nibble = self.path[next - 1];
        let prefix = &self.path[cursor..next - 1];
        let last = rest.is_empty();
        let scheme = self.commitments;

        match step {
            WireStep::Branch { neighbors, value_hash, .. } => {
                let child = self.walk(rest, next)?;
                let root = fold_neighbors(scheme, child, neighbors, nibble);
                let root = scheme.mix_value(root, value_hash.as_ref());
                Ok(scheme.digest_concat(&[prefix, &root]))
            }

            WireStep::Fork { nibble: neighbor_nibble, prefix: neighbor_prefix, root, .. } => {
                if *neighbor_nibble == nibble {
                    return Err(TrieError::InvalidProof("fork neighbor sits on the key path".to_string()));
                }
                if last && !self.including {
                    return Ok(scheme.digest_concat(&[prefix, &[*neighbor_nibble], neighbor_prefix, root]));
                }
                let child = self.walk(rest, next)?;
                let neighbor = scheme.digest_concat(&[neighbor_prefix, root]);
                Ok(sparse_branch(scheme, prefix, (nibble, child), (*neighbor_nibble, neighbor)))
            }

            WireStep::Leaf { key, value_hash, .. } => {
                let neighbor_path = bytes_to_nibbles(key);
                if neighbor_path.len() < next
                    || neighbor_path[..cursor] != self.path[..cursor]
                    || neighbor_path[next - 1] == nibble
                {
                    return Err(TrieError::InvalidProof("leaf neighbor does not fork at the step".to_string()));
                }
                if last && !self.including {
                    return Ok(scheme.commit_leaf(&neighbor_path[cursor..], value_hash));
                }
                let child = self.walk(rest, next)?;
                let neighbor = scheme.commit_leaf(&neighbor_path[next..], value_hash);
                Ok(sparse_branch(scheme, prefix, (nibble, child), (neighbor_path[next - 1], neighbor)))
            }
        }
    }

    fn terminal(&self, cursor: usize) -> Result<Hash> {
        match self.value_hash {
            Some(vh) if self.including => Ok(self.commitments.commit_leaf(&self.path[cursor.min(self.path.len())..], &vh)),
            _ => Ok(NULL_HASH),
        }
    }
}

/// Rebuild a 16-way Merkle root from one slot and its four neighbors
fn fold_neighbors(scheme: &CommitmentScheme, child: Hash, neighbors: &[Hash; NEIGHBOR_COUNT], nibble: Nibble) -> Hash {
    let mut acc = child;
    for (depth, neighbor) in neighbors.iter().enumerate().rev() {
        let bit = (nibble >> (NEIGHBOR_COUNT - 1 - depth)) & 1;
        acc = if bit == 0 {
            scheme.digest_concat(&[&acc, neighbor])
        } else {
            scheme.digest_concat(&[neighbor, &acc])
        };
    }
    acc
}

/// Commitment of a branch holding exactly two children
fn sparse_branch(scheme: &CommitmentScheme, prefix: &[Nibble], a: (Nibble, Hash), b: (Nibble, Hash)) -> Hash {
    let mut nodes = [NULL_HASH; BRANCH_WIDTH];
    nodes[a.0 as usize] = a.1;
    nodes[b.0 as usize] = b.1;
    let root = scheme.merkle_root(&nodes);
    scheme.digest_concat(&[prefix, &root])
}
