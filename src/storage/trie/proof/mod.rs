//! Inclusion and non-inclusion proofs.
//!
//! Each mode has its own proof format. In `Mode::Mpf` a proof is produced
//! in two stages: `traversal` walks the stored trie and records every branch
//! it crosses, then `wire` condenses each branch into the four neighbor
//! hashes the on-chain verifier folds back into a root. `verify` is the
//! off-chain counterpart of that fold.
//!
//! `Mode::Generic` keys can end anywhere in the trie, so its proofs carry
//! the encoded nodes on the path instead (`node_list`).

pub mod format;
pub mod node_list;
pub mod traversal;
pub mod verify;
pub mod wire;

pub use format::{proof_to_aiken, proof_to_json};
pub use node_list::NodeListProof;
pub use traversal::{ProofGenerator, ProofOutcome, TraversalProof, TraversalStep};
pub use verify::ProofVerifier;
pub use wire::{WireProof, WireStep};
