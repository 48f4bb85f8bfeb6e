use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// A 32-byte digest, used for node commitments and hashed keys
pub type Hash = [u8; 32];

/// Length in bytes of every digest produced by a `HashFunction`
pub const HASH_LENGTH: usize = 32;

type Blake2b256Core = Blake2b<U32>;

/// Compute the Blake2b-256 hash of data
pub fn blake2b_256(data: &[u8]) -> Hash {
    let mut hasher = Blake2b256Core::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Pluggable digest used by the commitment scheme and key hashing
pub trait HashFunction: Send + Sync {
    /// Hash the provided bytes
    fn digest(&self, data: &[u8]) -> Hash;

    /// Hash the concatenation of several byte slices
    fn digest_concat(&self, parts: &[&[u8]]) -> Hash {
        let total = parts.iter().map(|p| p.len()).sum();
        let mut buf = Vec::with_capacity(total);
        for part in parts {
            buf.extend_from_slice(part);
        }
        self.digest(&buf)
    }

    /// Short name of the algorithm
    fn name(&self) -> &'static str;
}

/// Blake2b with a 256-bit output, the hash used by the on-chain verifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blake2b256;

impl HashFunction for Blake2b256 {
    fn digest(&self, data: &[u8]) -> Hash {
        blake2b_256(data)
    }

    fn digest_concat(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = Blake2b256Core::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }

    fn name(&self) -> &'static str {
        "blake2b-256"
    }
}

/// Parse a 32-byte hash from a slice
pub fn hash_from_slice(bytes: &[u8]) -> Option<Hash> {
    if bytes.len() != HASH_LENGTH {
        return None;
    }
    let mut hash = [0u8; HASH_LENGTH];
    hash.copy_from_slice(bytes);
    Some(hash)
}
