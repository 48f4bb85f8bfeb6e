use std::sync::Arc;

use crate::config::TrieConfig;
use crate::crypto::{Blake2b256, Hash, HashFunction};
use crate::storage::kv_store::NodeStore;
use crate::storage::trie::commitment::{CommitmentScheme, Mode};
use crate::storage::trie::error::{Result, TrieError};
use crate::storage::trie::mpt::{verify_path, Entry, MerklePatriciaTrie};
use crate::storage::trie::nibbles::bytes_to_nibbles;
use crate::storage::trie::proof::{proof_to_aiken, proof_to_json};

/// Merkle Patricia Forestry keyed by Blake2b-256
///
/// Every key is hashed before it reaches the trie, so all paths are 64
/// nibbles long and proofs match the on-chain verifier. The un-hashed key
/// can optionally be kept in the leaf for enumeration.
pub struct MpfTrie {
    inner: MerklePatriciaTrie,
    hasher: Arc<dyn HashFunction>,
    store_original_keys: bool,
}

impl MpfTrie {
    /// Create an empty MPF trie over a store
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self::with_options(store, Mode::Mpf, false)
    }

    /// Create an empty MPF trie that keeps original keys in leaves
    pub fn with_original_key_storage(store: Arc<dyn NodeStore>) -> Self {
        Self::with_options(store, Mode::Mpf, true)
    }

    /// Create an empty trie with an explicit mode and key retention
    pub fn with_options(store: Arc<dyn NodeStore>, mode: Mode, store_original_keys: bool) -> Self {
        Self {
            inner: MerklePatriciaTrie::new(store, mode),
            hasher: Arc::new(Blake2b256),
            store_original_keys,
        }
    }

    /// Create an empty trie following the trie section of the configuration
    pub fn from_config(store: Arc<dyn NodeStore>, config: &TrieConfig) -> Self {
        Self::with_options(store, config.mode, config.store_original_keys)
    }

    /// Open an MPF trie at an existing root
    pub fn with_root(store: Arc<dyn NodeStore>, root: Option<Hash>) -> Self {
        let mut trie = Self::new(store);
        trie.set_root_hash(root);
        trie
    }

    /// Hash a key into its trie path
    pub fn hash_key(&self, key: &[u8]) -> Hash {
        self.hasher.digest(key)
    }

    /// Get the root hash of the trie, `None` when empty
    pub fn root_hash(&self) -> Option<Hash> {
        self.inner.root_hash()
    }

    /// Point the trie at another root
    pub fn set_root_hash(&mut self, root: Option<Hash>) {
        self.inner.set_root_hash(root);
    }

    /// Insert or update a key
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let path = self.hash_key(key);
        let original = if self.store_original_keys { Some(key) } else { None };
        self.inner.put_with_key(&path, value, original)
    }

    /// Get the value stored under a key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(&self.hash_key(key))
    }

    /// Delete a key; deleting an absent key is a no-op
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let path = self.hash_key(key);
        self.inner.delete(&path)
    }

    /// Entries whose hashed path starts with `prefix`
    ///
    /// The prefix is matched against hashed paths as given, it is not hashed.
    pub fn scan_by_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<Entry>> {
        self.inner.scan_by_prefix(prefix, limit)
    }

    /// Every entry in the trie
    pub fn get_all_entries(&self) -> Result<Vec<Entry>> {
        self.inner.get_all_entries()
    }

    /// Up to `limit` entries; `limit` must be positive
    pub fn get_entries(&self, limit: usize) -> Result<Vec<Entry>> {
        self.inner.get_entries(limit)
    }

    /// CBOR wire proof for a key
    pub fn get_proof_wire(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.inner.get_proof_wire(&self.hash_key(key))
    }

    /// Proof for a key in the JSON step shape of the JavaScript library
    pub fn get_proof_json(&self, key: &[u8]) -> Result<serde_json::Value> {
        self.require_step_proofs()?;
        proof_to_json(&self.get_proof_wire(key)?)
    }

    /// Proof for a key as an Aiken literal
    pub fn get_proof_aiken(&self, key: &[u8]) -> Result<String> {
        self.require_step_proofs()?;
        proof_to_aiken(&self.get_proof_wire(key)?)
    }

    fn require_step_proofs(&self) -> Result<()> {
        match self.inner.mode() {
            Mode::Mpf => Ok(()),
            Mode::Generic => Err(TrieError::InvalidArgument(
                "JSON and Aiken proofs are only produced in mpf mode".to_string(),
            )),
        }
    }

    /// Check a wire proof for `key` against `expected_root`
    pub fn verify_proof_wire(
        &self,
        expected_root: Option<&Hash>,
        key: &[u8],
        value: Option<&[u8]>,
        including: bool,
        wire: &[u8],
    ) -> bool {
        let path = bytes_to_nibbles(&self.hash_key(key));
        verify_path(self.inner.persistence().commitments(), expected_root, &path, value, including, wire)
    }
}

/// Verify an MPF wire proof without a trie instance
pub fn verify_proof(expected_root: Option<&Hash>, key: &[u8], value: Option<&[u8]>, including: bool, wire: &[u8]) -> bool {
    let commitments = CommitmentScheme::mpf();
    let path = bytes_to_nibbles(&commitments.digest(key));
    verify_path(&commitments, expected_root, &path, value, including, wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::blake2b_256;
    use crate::storage::kv_store::MemoryStore;

    fn trie() -> MpfTrie {
        MpfTrie::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_put_get_delete_scenario() {
        let mut t = trie();
        t.put(b"a", b"1").unwrap();
        t.put(b"b", b"2").unwrap();
        assert!(t.root_hash().is_some());
        assert_eq!(t.get(b"a").unwrap(), Some(b"1".to_vec()));

        t.delete(b"b").unwrap();
        let r2 = t.root_hash();

        let mut fresh = trie();
        fresh.put(b"a", b"1").unwrap();
        assert_eq!(r2, fresh.root_hash());

        let wire = t.get_proof_wire(b"a").unwrap();
        assert!(t.verify_proof_wire(r2.as_ref(), b"a", Some(b"1"), true, &wire));

        let wire = t.get_proof_wire(b"c").unwrap();
        assert!(t.verify_proof_wire(r2.as_ref(), b"c", None, false, &wire));
    }

    #[test]
    fn test_single_leaf_root() {
        let mut t = trie();
        t.put(b"key", b"value").unwrap();

        let expected = blake2b_256(&[&[0xff][..], &blake2b_256(b"key"), &blake2b_256(b"value")].concat());
        assert_eq!(t.root_hash(), Some(expected));
    }

    #[test]
    fn test_original_keys_follow_configuration() {
        let mut plain = trie();
        plain.put(b"apple", b"red").unwrap();
        assert_eq!(plain.get_all_entries().unwrap()[0].key, None);

        let mut keyed = MpfTrie::with_original_key_storage(Arc::new(MemoryStore::new()));
        keyed.put(b"apple", b"red").unwrap();
        let entries = keyed.get_all_entries().unwrap();
        assert_eq!(entries[0].key, Some(b"apple".to_vec()));
        assert_eq!(entries[0].path, blake2b_256(b"apple").to_vec());

        // Retained keys never change the commitment
        assert_eq!(plain.root_hash(), keyed.root_hash());
    }

    #[test]
    fn test_from_config() {
        let config = TrieConfig { mode: Mode::Generic, store_original_keys: true };
        let mut t = MpfTrie::from_config(Arc::new(MemoryStore::new()), &config);
        t.put(b"k", b"v").unwrap();
        t.put(b"j", b"w").unwrap();
        assert!(t.get_all_entries().unwrap().iter().all(|e| e.key.is_some()));

        let root = t.root_hash();
        let wire = t.get_proof_wire(b"k").unwrap();
        assert!(t.verify_proof_wire(root.as_ref(), b"k", Some(b"v"), true, &wire));
        assert!(!verify_proof(root.as_ref(), b"k", Some(b"v"), true, &wire));
        assert!(matches!(t.get_proof_json(b"k"), Err(TrieError::InvalidArgument(_))));
    }

    #[test]
    fn test_scan_over_hashed_paths() {
        let mut t = trie();
        for i in 0..32u8 {
            t.put(&[i], &[i, i]).unwrap();
        }
        // A leading zero nibble would be stripped from the prefix
        let first = (0..32u8)
            .map(|i| blake2b_256(&[i])[0])
            .find(|b| b >> 4 != 0)
            .unwrap();
        let matching = (0..32u8).filter(|i| blake2b_256(&[*i])[0] == first).count();

        let found = t.scan_by_prefix(&[first], 0).unwrap();
        assert_eq!(found.len(), matching);
        assert!(found.iter().all(|e| e.path[0] == first));
        assert_eq!(t.get_entries(5).unwrap().len(), 5);
        assert_eq!(t.get_all_entries().unwrap().len(), 32);
    }

    #[test]
    fn test_proof_formats() {
        let mut t = trie();
        t.put(b"a", b"1").unwrap();
        t.put(b"b", b"2").unwrap();

        let json = t.get_proof_json(b"a").unwrap();
        assert!(json.as_array().is_some());
        let aiken = t.get_proof_aiken(b"a").unwrap();
        assert!(aiken.starts_with('['));
    }

    #[test]
    fn test_standalone_verification() {
        let mut t = trie();
        t.put(b"x", b"1").unwrap();
        t.put(b"y", b"2").unwrap();
        let root = t.root_hash();
        let wire = t.get_proof_wire(b"y").unwrap();

        assert!(verify_proof(root.as_ref(), b"y", Some(b"2"), true, &wire));
        assert!(!verify_proof(root.as_ref(), b"y", Some(b"3"), true, &wire));
        assert!(!verify_proof(Some(&[0u8; 32]), b"y", Some(b"2"), true, &wire));
    }
}
