// Blockchain module
//
// This module contains the ledger core:
// - Hashing of ordered fields
// - Identities and signatures
// - Transaction and Block structures
// - Proof of work mining
// - The ledger and its batching cycle

pub mod block;
pub mod chain;
pub mod crypto;
pub mod hashing;
pub mod mining;
pub mod timestamp;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{BatchState, ChainValidationError, Ledger};
pub use crypto::{Address, CryptoError, DigitalSignature, Identity};
pub use hashing::HashEngine;
pub use mining::{MinerKind, MiningStats, ProofOfWorkMiner};
pub use timestamp::Timestamp;
pub use transaction::Transaction;
