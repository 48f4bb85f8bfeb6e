// Merkle Patricia Forestry - an authenticated key-value store with proofs for the Aiken on-chain verifier

pub mod config;
pub mod crypto;
pub mod storage;

// Initialize logging
pub fn init_logger() {
    env_logger::init();
}
