//! A minimal proof-of-work ledger.
//!
//! Signed transactions are queued on a [`Ledger`]; once `batch_size` of them
//! are pending they are sealed into a block, mined until its hash carries
//! `difficulty` leading zero hex digits, and appended to the chain.

pub mod blockchain;
pub mod config;

pub use blockchain::{
    Address, BatchState, Block, ChainValidationError, Identity, Ledger, MinerKind,
    ProofOfWorkMiner, Transaction,
};
pub use config::{ConfigError, LedgerConfig};
