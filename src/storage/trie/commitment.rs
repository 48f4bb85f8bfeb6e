use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::{Blake2b256, Hash, HashFunction};
use crate::storage::trie::nibbles::{nibbles_to_bytes, Nibble};
use crate::storage::trie::node::BRANCH_WIDTH;

/// Hash standing in for an absent child inside branch Merkle trees
pub const NULL_HASH: Hash = [0u8; 32];

/// Commitment mode of a trie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Branch values never enter branch commitments; matches the on-chain verifier
    Mpf,
    /// Branch values are mixed into branch commitments
    Generic,
}

impl Mode {
    /// Whether branch values participate in the branch commitment
    pub fn encodes_branch_value(self) -> bool {
        matches!(self, Mode::Generic)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Mpf
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Mpf => write!(f, "mpf"),
            Mode::Generic => write!(f, "generic"),
        }
    }
}

/// Derives node commitments for a given hash function and mode
#[derive(Clone)]
pub struct CommitmentScheme {
    hasher: Arc<dyn HashFunction>,
    mode: Mode,
}

impl fmt::Debug for CommitmentScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitmentScheme")
            .field("hasher", &self.hasher.name())
            .field("mode", &self.mode)
            .finish()
    }
}

impl CommitmentScheme {
    /// Create a scheme from a hash function and mode
    pub fn new(hasher: Arc<dyn HashFunction>, mode: Mode) -> Self {
        Self { hasher, mode }
    }

    /// Blake2b-256 scheme for the given mode
    pub fn for_mode(mode: Mode) -> Self {
        Self::new(Arc::new(Blake2b256), mode)
    }

    /// Blake2b-256 scheme compatible with the on-chain verifier
    pub fn mpf() -> Self {
        Self::for_mode(Mode::Mpf)
    }

    /// Blake2b-256 scheme mixing branch values
    pub fn generic() -> Self {
        Self::for_mode(Mode::Generic)
    }

    /// Active mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Hash arbitrary bytes with the underlying hash function
    pub fn digest(&self, data: &[u8]) -> Hash {
        self.hasher.digest(data)
    }

    /// Hash the concatenation of several slices
    pub fn digest_concat(&self, parts: &[&[u8]]) -> Hash {
        self.hasher.digest_concat(parts)
    }

    /// Commitment of a leaf with the given suffix and value hash
    ///
    /// Even suffixes are prefixed by 0xff and packed two nibbles per byte.
    /// Odd suffixes carry 0x00 and the first nibble as whole bytes, then
    /// the remaining nibbles packed.
    pub fn commit_leaf(&self, suffix: &[Nibble], value_hash: &Hash) -> Hash {
        if suffix.len() % 2 == 0 {
            let tail = nibbles_to_bytes(suffix);
            self.digest_concat(&[&[0xff], &tail, value_hash])
        } else {
            let tail = nibbles_to_bytes(&suffix[1..]);
            self.digest_concat(&[&[0x00, suffix[0]], &tail, value_hash])
        }
    }

    /// Pairwise Merkle root over a power-of-two number of hashes
    pub fn merkle_root(&self, nodes: &[Hash]) -> Hash {
        let mut level: Vec<Hash> = nodes.to_vec();
        if level.is_empty() {
            return NULL_HASH;
        }
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => self.digest_concat(&[left, right]),
                    [single] => *single,
                    _ => NULL_HASH,
                })
                .collect();
        }
        level[0]
    }

    /// Child slots with absent entries replaced by the null hash
    pub fn materialize(children: &[Option<Hash>; BRANCH_WIDTH]) -> [Hash; BRANCH_WIDTH] {
        let mut nodes = [NULL_HASH; BRANCH_WIDTH];
        for (slot, child) in nodes.iter_mut().zip(children.iter()) {
            if let Some(hash) = child {
                *slot = *hash;
            }
        }
        nodes
    }

    /// Merkle root of a branch's 16 slots, value-mixed in generic mode
    pub fn branch_root(&self, children: &[Option<Hash>; BRANCH_WIDTH], value_hash: Option<&Hash>) -> Hash {
        let root = self.merkle_root(&Self::materialize(children));
        self.mix_value(root, value_hash)
    }

    /// Mix a branch value hash into a 16-way Merkle root when the mode requires it
    pub fn mix_value(&self, root: Hash, value_hash: Option<&Hash>) -> Hash {
        match value_hash {
            Some(vh) if self.mode.encodes_branch_value() => {
                let value_commit = self.commit_leaf(&[], vh);
                self.digest_concat(&[&root, &value_commit])
            }
            _ => root,
        }
    }

    /// Commitment of a branch reached through `prefix`
    ///
    /// The prefix is hashed one byte per nibble. A branch's own commitment
    /// uses an empty prefix.
    pub fn commit_branch(
        &self,
        prefix: &[Nibble],
        children: &[Option<Hash>; BRANCH_WIDTH],
        value_hash: Option<&Hash>,
    ) -> Hash {
        let root = self.branch_root(children, value_hash);
        self.digest_concat(&[prefix, &root])
    }

    /// Commitment of an extension whose child could not be resolved
    pub fn commit_extension(&self, path: &[Nibble], child: &Hash) -> Hash {
        self.digest_concat(&[path, child])
    }
}

impl Default for CommitmentScheme {
    fn default() -> Self {
        Self::mpf()
    }
}
