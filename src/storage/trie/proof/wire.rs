use ciborium::value::{Integer, Value};

use crate::crypto::{hash_from_slice, Hash, HASH_LENGTH};
use crate::storage::trie::commitment::CommitmentScheme;
use crate::storage::trie::error::{Result, TrieError};
use crate::storage::trie::nibbles::{common_prefix_len, nibbles_to_bytes, Nibble};
use crate::storage::trie::node::BRANCH_WIDTH;
use crate::storage::trie::proof::traversal::{ProofOutcome, TraversalProof, TraversalStep};

/// CBOR tag of a branch step (and of a fork's neighbor record)
pub const TAG_BRANCH: u64 = 121;
/// CBOR tag of a fork step
pub const TAG_FORK: u64 = 122;
/// CBOR tag of a leaf step
pub const TAG_LEAF: u64 = 123;

/// Number of neighbor hashes carried by a branch step
pub const NEIGHBOR_COUNT: usize = 4;

/// A single step of a serialized proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireStep {
    /// Branch with the sibling subtree roots needed to rebuild its Merkle root
    Branch {
        skip: usize,
        neighbors: [Hash; NEIGHBOR_COUNT],
        value_hash: Option<Hash>,
    },
    /// Branch whose only other child is an extension-rooted subtree
    Fork {
        skip: usize,
        nibble: Nibble,
        prefix: Vec<Nibble>,
        root: Hash,
    },
    /// Branch whose only other child is a leaf
    Leaf {
        skip: usize,
        key: Vec<u8>,
        value_hash: Hash,
    },
}

impl WireStep {
    /// Skipped nibbles before this step's branch point
    pub fn skip(&self) -> usize {
        match self {
            WireStep::Branch { skip, .. } | WireStep::Fork { skip, .. } | WireStep::Leaf { skip, .. } => *skip,
        }
    }
}

/// Serialized inclusion or non-inclusion proof
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireProof {
    pub steps: Vec<WireStep>,
}

/// Sibling subtree roots of slot `me`, from the top level down
///
/// Walks the 16 slots as a binary tree: at each level the half not
/// containing `me` is summarised by its Merkle root.
pub fn neighbors(commitments: &CommitmentScheme, nodes: &[Hash; BRANCH_WIDTH], me: usize) -> [Hash; NEIGHBOR_COUNT] {
    let mut result = [[0u8; 32]; NEIGHBOR_COUNT];
    let mut pivot = 8;
    let mut n = 8;

    for slot in result.iter_mut() {
        if me < pivot {
            *slot = commitments.merkle_root(&nodes[pivot..pivot + n]);
            pivot -= n / 2;
        } else {
            *slot = commitments.merkle_root(&nodes[pivot - n..pivot]);
            pivot += n / 2;
        }
        n /= 2;
    }
    result
}

impl WireProof {
    /// Convert a traversal into wire steps for the queried key
    pub fn from_traversal(proof: &TraversalProof, key: &[Nibble], commitments: &CommitmentScheme) -> Self {
        let mut steps = Vec::with_capacity(proof.steps.len() + 1);
        let mut consumed = 0;

        for step in &proof.steps {
            consumed += 1 + step.skip_len();
            match step {
                TraversalStep::Branch { skip, children, index, value_hash } => {
                    let nodes = CommitmentScheme::materialize(children);
                    let me = index.map_or(0, usize::from);
                    steps.push(WireStep::Branch {
                        skip: skip.len(),
                        neighbors: neighbors(commitments, &nodes, me),
                        value_hash: *value_hash,
                    });
                }
                TraversalStep::Fork { skip, nibble, suffix, root } => {
                    steps.push(WireStep::Fork {
                        skip: skip.len(),
                        nibble: *nibble,
                        prefix: suffix.clone(),
                        root: *root,
                    });
                }
            }
        }

        if let ProofOutcome::DifferentLeaf { path, value_hash, .. } = &proof.outcome {
            let consumed = consumed.min(key.len()).min(path.len());
            let skip = common_prefix_len(&key[consumed..], &path[consumed..]);
            steps.push(WireStep::Leaf {
                skip,
                key: nibbles_to_bytes(path),
                value_hash: *value_hash,
            });
        }

        Self { steps }
    }

    /// Encode as a CBOR array of tagged steps
    pub fn encode(&self) -> Result<Vec<u8>> {
        let items = self.steps.iter().map(step_to_value).collect();
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&Value::Array(items), &mut buf)
            .map_err(|e| TrieError::Encode(format!("Failed to encode proof: {:?}", e)))?;
        Ok(buf)
    }

    /// Decode a CBOR proof
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| TrieError::Decode(format!("Invalid proof CBOR: {:?}", e)))?;
        let items = match value {
            Value::Array(items) => items,
            other => return Err(TrieError::Decode(format!("Proof is not an array: {:?}", other))),
        };
        let steps = items.into_iter().map(step_from_value).collect::<Result<Vec<_>>>()?;
        Ok(Self { steps })
    }

    /// Whether the proof has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn uint(n: usize) -> Value {
    Value::Integer(Integer::from(n as u64))
}

fn tagged(tag: u64, fields: Vec<Value>) -> Value {
    Value::Tag(tag, Box::new(Value::Array(fields)))
}

fn step_to_value(step: &WireStep) -> Value {
    match step {
        WireStep::Branch { skip, neighbors, value_hash } => {
            let mut fields = vec![uint(*skip), Value::Bytes(neighbors.concat())];
            if let Some(vh) = value_hash {
                fields.push(Value::Bytes(vh.to_vec()));
            }
            tagged(TAG_BRANCH, fields)
        }
        WireStep::Fork { skip, nibble, prefix, root } => {
            let neighbor = tagged(
                TAG_BRANCH,
                vec![uint(usize::from(*nibble)), Value::Bytes(prefix.clone()), Value::Bytes(root.to_vec())],
            );
            tagged(TAG_FORK, vec![uint(*skip), neighbor])
        }
        WireStep::Leaf { skip, key, value_hash } => tagged(
            TAG_LEAF,
            vec![uint(*skip), Value::Bytes(key.clone()), Value::Bytes(value_hash.to_vec())],
        ),
    }
}

fn step_from_value(value: Value) -> Result<WireStep> {
    let (tag, fields) = untag(value)?;
    match tag {
        TAG_BRANCH => {
            if fields.len() != 2 && fields.len() != 3 {
                return Err(TrieError::Decode(format!("Branch step has {} fields", fields.len())));
            }
            let mut fields = fields.into_iter();
            let skip = read_uint(fields.next())?;
            let packed = read_bytes(fields.next())?;
            if packed.len() != NEIGHBOR_COUNT * HASH_LENGTH {
                return Err(TrieError::Decode(format!("neighbors must be 128 bytes, got {}", packed.len())));
            }
            let mut neighbors = [[0u8; 32]; NEIGHBOR_COUNT];
            for (slot, chunk) in neighbors.iter_mut().zip(packed.chunks(HASH_LENGTH)) {
                slot.copy_from_slice(chunk);
            }
            let value_hash = match fields.next() {
                Some(v) => Some(read_hash(Some(v))?),
                None => None,
            };
            Ok(WireStep::Branch { skip, neighbors, value_hash })
        }
        TAG_FORK => {
            if fields.len() != 2 {
                return Err(TrieError::Decode(format!("Fork step has {} fields", fields.len())));
            }
            let mut fields = fields.into_iter();
            let skip = read_uint(fields.next())?;
            let (inner_tag, neighbor) = untag(fields.next().unwrap_or(Value::Null))?;
            if inner_tag != TAG_BRANCH || neighbor.len() != 3 {
                return Err(TrieError::Decode("Malformed fork neighbor".to_string()));
            }
            let mut neighbor = neighbor.into_iter();
            let nibble = read_uint(neighbor.next())?;
            if nibble >= BRANCH_WIDTH {
                return Err(TrieError::Decode(format!("Fork nibble out of range: {}", nibble)));
            }
            let prefix = read_bytes(neighbor.next())?;
            if prefix.iter().any(|&n| n >= BRANCH_WIDTH as u8) {
                return Err(TrieError::Decode("Fork prefix holds a non-nibble byte".to_string()));
            }
            let root = read_hash(neighbor.next())?;
            Ok(WireStep::Fork { skip, nibble: nibble as Nibble, prefix, root })
        }
        TAG_LEAF => {
            if fields.len() != 3 {
                return Err(TrieError::Decode(format!("Leaf step has {} fields", fields.len())));
            }
            let mut fields = fields.into_iter();
            let skip = read_uint(fields.next())?;
            let key = read_bytes(fields.next())?;
            let value_hash = read_hash(fields.next())?;
            Ok(WireStep::Leaf { skip, key, value_hash })
        }
        other => Err(TrieError::Decode(format!("Unknown proof step tag: {}", other))),
    }
}

fn untag(value: Value) -> Result<(u64, Vec<Value>)> {
    match value {
        Value::Tag(tag, inner) => match *inner {
            Value::Array(fields) => Ok((tag, fields)),
            other => Err(TrieError::Decode(format!("Tagged step is not an array: {:?}", other))),
        },
        other => Err(TrieError::Decode(format!("Proof step is not tagged: {:?}", other))),
    }
}

fn read_uint(value: Option<Value>) -> Result<usize> {
    match value {
        Some(Value::Integer(i)) => u64::try_from(i)
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| TrieError::Decode("Proof integer out of range".to_string())),
        other => Err(TrieError::Decode(format!("Expected unsigned integer, got {:?}", other))),
    }
}

fn read_bytes(value: Option<Value>) -> Result<Vec<u8>> {
    match value {
        Some(Value::Bytes(b)) => Ok(b),
        other => Err(TrieError::Decode(format!("Expected byte string, got {:?}", other))),
    }
}

fn read_hash(value: Option<Value>) -> Result<Hash> {
    let bytes = read_bytes(value)?;
    hash_from_slice(&bytes).ok_or_else(|| TrieError::Decode(format!("Expected 32-byte hash, got {}", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> [Hash; BRANCH_WIDTH] {
        let mut nodes = [[0u8; 32]; BRANCH_WIDTH];
        for (i, node) in nodes.iter_mut().enumerate() {
            node[0] = i as u8 + 1;
        }
        nodes
    }

    #[test]
    fn test_neighbors_follow_the_binary_tree() {
        let scheme = CommitmentScheme::mpf();
        let nodes = slots();

        let n = neighbors(&scheme, &nodes, 0);
        assert_eq!(n[0], scheme.merkle_root(&nodes[8..16]));
        assert_eq!(n[1], scheme.merkle_root(&nodes[4..8]));
        assert_eq!(n[2], scheme.merkle_root(&nodes[2..4]));
        assert_eq!(n[3], nodes[1]);

        let n = neighbors(&scheme, &nodes, 13);
        assert_eq!(n[0], scheme.merkle_root(&nodes[0..8]));
        assert_eq!(n[1], scheme.merkle_root(&nodes[8..12]));
        assert_eq!(n[2], scheme.merkle_root(&nodes[14..16]));
        assert_eq!(n[3], nodes[12]);
    }

    #[test]
    fn test_encode_decode_all_step_kinds() {
        let proof = WireProof {
            steps: vec![
                WireStep::Branch { skip: 2, neighbors: [[1u8; 32], [2u8; 32], [3u8; 32], [4u8; 32]], value_hash: None },
                WireStep::Fork { skip: 0, nibble: 7, prefix: vec![1, 2, 3], root: [9u8; 32] },
                WireStep::Leaf { skip: 1, key: vec![0xaa; 32], value_hash: [5u8; 32] },
            ],
        };
        let bytes = proof.encode().unwrap();
        assert_eq!(WireProof::decode(&bytes).unwrap(), proof);

        // Tag 121 is encoded as 0xd8 0x79
        assert_eq!(&bytes[..3], &[0x83, 0xd8, 0x79]);
    }

    #[test]
    fn test_empty_proof_is_empty_array() {
        let bytes = WireProof::default().encode().unwrap();
        assert_eq!(bytes, vec![0x80]);
        assert!(WireProof::decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed_steps() {
        let encode = |v: Value| {
            let mut buf = Vec::new();
            ciborium::ser::into_writer(&v, &mut buf).unwrap();
            buf
        };

        // Unknown tag
        let bad_tag = Value::Array(vec![tagged(200, vec![uint(0)])]);
        assert!(WireProof::decode(&encode(bad_tag)).is_err());

        // Short neighbors
        let short = Value::Array(vec![tagged(TAG_BRANCH, vec![uint(0), Value::Bytes(vec![0u8; 64])])]);
        assert!(WireProof::decode(&encode(short)).is_err());

        // Untagged step
        let untagged = Value::Array(vec![Value::Array(vec![uint(0)])]);
        assert!(WireProof::decode(&encode(untagged)).is_err());

        // Fork nibble out of range
        let fork = Value::Array(vec![tagged(
            TAG_FORK,
            vec![uint(0), tagged(TAG_BRANCH, vec![uint(16), Value::Bytes(vec![]), Value::Bytes(vec![0u8; 32])])],
        )]);
        assert!(WireProof::decode(&encode(fork)).is_err());

        // Not CBOR at all
        assert!(WireProof::decode(&[0xff]).is_err());
    }
}
