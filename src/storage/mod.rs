// Storage module for the forestry trie
// Provides the node stores and the trie built on top of them

pub mod kv_store;
pub mod trie;

// Re-export main components
pub use kv_store::{KVStoreError, MemoryStore, NodeStore, RocksDBStore};
pub use trie::{MerklePatriciaTrie, Mode, MpfTrie, TrieError};
