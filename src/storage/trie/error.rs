use thiserror::Error;

use crate::storage::kv_store::KVStoreError;

/// Errors surfaced by trie operations
#[derive(Debug, Error)]
pub enum TrieError {
    /// The backing node store failed
    #[error("Store error: {0}")]
    Store(#[from] KVStoreError),

    /// Bytes do not form a valid node, path or proof encoding
    #[error("Decode error: {0}")]
    Decode(String),

    /// A node or proof could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// The caller passed an argument the trie cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A proof is structurally valid CBOR but inconsistent with the queried path
    #[error("Invalid proof: {0}")]
    InvalidProof(String),
}

/// Result alias for trie operations
pub type Result<T> = std::result::Result<T, TrieError>;
