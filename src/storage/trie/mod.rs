//! Merkle Patricia Forestry implementation
//!
//! This module provides a content-addressed Merkle Patricia Trie whose root
//! hash and proofs are bit-compatible with the Aiken on-chain verifier.
//! Nodes live in a `NodeStore` keyed by their commitment; every mutation
//! yields a new root while older roots remain readable.
//!
//! `MerklePatriciaTrie` works on raw byte paths. `MpfTrie` hashes every key
//! with Blake2b-256 first and is the entry point for on-chain use.

pub mod commitment;
pub mod delete;
pub mod error;
pub mod get;
pub mod mpf;
pub mod mpt;
pub mod nibbles;
pub mod node;
pub mod persistence;
pub mod proof;
pub mod put;
pub mod splitter;

// Re-export main components
pub use commitment::{CommitmentScheme, Mode, NULL_HASH};
pub use error::{Result, TrieError};
pub use mpf::{verify_proof, MpfTrie};
pub use mpt::{Entry, MerklePatriciaTrie};
pub use node::Node;
pub use persistence::NodePersistence;
pub use proof::{proof_to_aiken, proof_to_json, WireProof, WireStep};
