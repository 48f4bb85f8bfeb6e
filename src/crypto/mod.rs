// Merkle Forestry cryptography module
//
// Digest primitives used for node commitments and key hashing.

pub mod hash;

// Re-export main components for easier access
pub use hash::{blake2b_256, hash_from_slice, Blake2b256, Hash, HashFunction, HASH_LENGTH};
