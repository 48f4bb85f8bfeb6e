use serde::{Serialize, Deserialize};

use crate::storage::trie::Mode;

/// Trie behaviour configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrieConfig {
    /// Commitment mode; `mpf` is required for on-chain proofs
    pub mode: Mode,

    /// Keep the un-hashed key inside leaves
    pub store_original_keys: bool,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Mpf,
            store_original_keys: false,
        }
    }
}
