use std::sync::Arc;

use log::debug;

use crate::crypto::Hash;
use crate::storage::kv_store::NodeStore;
use crate::storage::trie::commitment::{CommitmentScheme, Mode};
use crate::storage::trie::delete::DeleteOperation;
use crate::storage::trie::error::{Result, TrieError};
use crate::storage::trie::get::GetOperation;
use crate::storage::trie::nibbles::{bytes_to_nibbles, nibbles_to_bytes, Nibble};
use crate::storage::trie::node::{Node, BRANCH_WIDTH};
use crate::storage::trie::persistence::NodePersistence;
use crate::storage::trie::proof::{NodeListProof, ProofGenerator, ProofVerifier, TraversalProof, WireProof};
use crate::storage::trie::put::PutOperation;

/// A stored entry returned by scans and enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Trie path of the entry, packed two nibbles per byte
    pub path: Vec<u8>,
    /// Stored value
    pub value: Vec<u8>,
    /// Original (un-hashed) key, when the leaf kept one
    pub key: Option<Vec<u8>>,
}

/// Merkle Patricia Trie over raw byte paths
///
/// Keys are used as given, so variable-length keys and branch values are
/// possible. Use `Mode::Generic` for such key sets: `Mode::Mpf` does not
/// commit branch values.
pub struct MerklePatriciaTrie {
    persistence: NodePersistence,
    root: Option<Hash>,
}

impl MerklePatriciaTrie {
    /// Create a new empty trie over a store
    pub fn new(store: Arc<dyn NodeStore>, mode: Mode) -> Self {
        Self::with_scheme(store, CommitmentScheme::for_mode(mode))
    }

    /// Create a new empty trie with a custom commitment scheme
    pub fn with_scheme(store: Arc<dyn NodeStore>, commitments: CommitmentScheme) -> Self {
        Self {
            persistence: NodePersistence::new(store, commitments),
            root: None,
        }
    }

    /// Open a trie at an existing root
    pub fn with_root(store: Arc<dyn NodeStore>, mode: Mode, root: Option<Hash>) -> Self {
        let mut trie = Self::new(store, mode);
        trie.root = root;
        trie
    }

    /// Get the root hash of the trie, `None` when empty
    pub fn root_hash(&self) -> Option<Hash> {
        self.root
    }

    /// Point the trie at another root; earlier roots stay readable
    pub fn set_root_hash(&mut self, root: Option<Hash>) {
        self.root = root;
    }

    /// Commitment mode of the trie
    pub fn mode(&self) -> Mode {
        self.persistence.commitments().mode()
    }

    /// Node persistence backing the trie
    pub fn persistence(&self) -> &NodePersistence {
        &self.persistence
    }

    /// Insert a key-value pair into the trie
    pub fn put(&mut self, path: &[u8], value: &[u8]) -> Result<()> {
        self.put_with_key(path, value, None)
    }

    /// Insert a key-value pair, keeping `original_key` in the leaf
    pub fn put_with_key(&mut self, path: &[u8], value: &[u8], original_key: Option<&[u8]>) -> Result<()> {
        if value.is_empty() {
            return Err(TrieError::InvalidArgument("value must not be empty".to_string()));
        }
        let nibbles = bytes_to_nibbles(path);
        let root = PutOperation::new(&self.persistence, &nibbles, value, original_key).apply(self.root.as_ref())?;
        debug!("put {} -> root {}", hex::encode(path), hex::encode(root));
        self.root = Some(root);
        Ok(())
    }

    /// Get a value from the trie
    pub fn get(&self, path: &[u8]) -> Result<Option<Vec<u8>>> {
        let nibbles = bytes_to_nibbles(path);
        GetOperation::new(&self.persistence, &nibbles).apply(self.root.as_ref())
    }

    /// Delete a key from the trie; deleting an absent key is a no-op
    pub fn delete(&mut self, path: &[u8]) -> Result<()> {
        let nibbles = bytes_to_nibbles(path);
        self.root = DeleteOperation::new(&self.persistence, &nibbles).apply(self.root.as_ref())?;
        debug!(
            "delete {} -> root {}",
            hex::encode(path),
            self.root.map(hex::encode).unwrap_or_else(|| "empty".to_string())
        );
        Ok(())
    }

    /// Entries whose path starts with the nibbles of `prefix`, in nibble order
    ///
    /// A leading zero nibble of the prefix is dropped, so a one-nibble prefix
    /// may be passed as a single byte `0x0N`. A `limit` of 0 means unlimited.
    pub fn scan_by_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<Entry>> {
        let mut nibbles = bytes_to_nibbles(prefix);
        if nibbles.first() == Some(&0) {
            nibbles.remove(0);
        }
        self.scan_nibbles(&nibbles, limit)
    }

    /// Every entry in the trie, in nibble order
    pub fn get_all_entries(&self) -> Result<Vec<Entry>> {
        self.scan_nibbles(&[], 0)
    }

    /// Up to `limit` entries in nibble order; `limit` must be positive
    pub fn get_entries(&self, limit: usize) -> Result<Vec<Entry>> {
        if limit == 0 {
            return Err(TrieError::InvalidArgument("limit must be positive".to_string()));
        }
        self.scan_nibbles(&[], limit)
    }

    fn scan_nibbles(&self, prefix: &[Nibble], limit: usize) -> Result<Vec<Entry>> {
        let mut scanner = Scanner {
            persistence: &self.persistence,
            prefix,
            limit: if limit == 0 { usize::MAX } else { limit },
            path: Vec::new(),
            out: Vec::new(),
        };
        if let Some(root) = self.root {
            scanner.visit(&root)?;
        }
        Ok(scanner.out)
    }

    /// Walk towards `path` and record the proof steps
    pub fn proof(&self, path: &[u8]) -> Result<TraversalProof> {
        let nibbles = bytes_to_nibbles(path);
        ProofGenerator::new(&self.persistence, &nibbles).generate(self.root.as_ref())
    }

    /// CBOR wire proof of inclusion or exclusion of `path`
    ///
    /// `Mode::Mpf` produces the on-chain step format, `Mode::Generic` a
    /// node-list proof.
    pub fn get_proof_wire(&self, path: &[u8]) -> Result<Vec<u8>> {
        let nibbles = bytes_to_nibbles(path);
        match self.mode() {
            Mode::Mpf => {
                let proof = ProofGenerator::new(&self.persistence, &nibbles).generate(self.root.as_ref())?;
                WireProof::from_traversal(&proof, &nibbles, self.persistence.commitments()).encode()
            }
            Mode::Generic => NodeListProof::generate(&self.persistence, &nibbles, self.root.as_ref())?.encode(),
        }
    }

    /// Check a wire proof for `path` against `expected_root`
    ///
    /// Returns `false` for any malformed or mismatching proof.
    pub fn verify_proof_wire(
        &self,
        expected_root: Option<&Hash>,
        path: &[u8],
        value: Option<&[u8]>,
        including: bool,
        wire: &[u8],
    ) -> bool {
        verify_path(self.persistence.commitments(), expected_root, &bytes_to_nibbles(path), value, including, wire)
    }
}

/// Decode a wire proof and check it for a nibble path
pub(crate) fn verify_path(
    commitments: &CommitmentScheme,
    expected_root: Option<&Hash>,
    path: &[Nibble],
    value: Option<&[u8]>,
    including: bool,
    wire: &[u8],
) -> bool {
    let verified = match commitments.mode() {
        Mode::Mpf => WireProof::decode(wire)
            .map(|proof| ProofVerifier::new(commitments, path, value, including).verify(expected_root, &proof)),
        Mode::Generic => NodeListProof::decode(wire)
            .map(|proof| proof.verify(commitments, expected_root, path, value, including)),
    };
    match verified {
        Ok(valid) => valid,
        Err(e) => {
            debug!("Undecodable proof: {}", e);
            false
        }
    }
}

/// Depth-first prefix scan, pruning subtrees that cannot match
struct Scanner<'a> {
    persistence: &'a NodePersistence,
    prefix: &'a [Nibble],
    limit: usize,
    path: Vec<Nibble>,
    out: Vec<Entry>,
}

impl Scanner<'_> {
    fn done(&self) -> bool {
        self.out.len() >= self.limit
    }

    /// Whether the current path and the prefix agree on their overlap
    fn compatible(&self) -> bool {
        let overlap = self.path.len().min(self.prefix.len());
        self.path[..overlap] == self.prefix[..overlap]
    }

    fn emit(&mut self, value: Vec<u8>, key: Option<Vec<u8>>) {
        if self.path.starts_with(self.prefix) {
            self.out.push(Entry {
                path: nibbles_to_bytes(&self.path),
                value,
                key,
            });
        }
    }

    fn visit(&mut self, hash: &Hash) -> Result<()> {
        if self.done() {
            return Ok(());
        }
        let node = match self.persistence.load(hash)? {
            Some(node) => node,
            None => return Ok(()),
        };

        match node {
            Node::Leaf { path, value, key } => {
                self.path.extend_from_slice(&path);
                self.emit(value, key);
                self.path.truncate(self.path.len() - path.len());
            }
            Node::Extension { path, child } => {
                self.path.extend_from_slice(&path);
                if self.compatible() {
                    self.visit(&child)?;
                }
                self.path.truncate(self.path.len() - path.len());
            }
            Node::Branch { children, value } => {
                if let Some(value) = value {
                    self.emit(value, None);
                }
                for (index, child) in children.iter().enumerate().take(BRANCH_WIDTH) {
                    if self.done() {
                        break;
                    }
                    if let Some(child) = child {
                        self.path.push(index as Nibble);
                        if self.compatible() {
                            self.visit(child)?;
                        }
                        self.path.pop();
                    }
                }
            }
        }
        Ok(())
    }
}
