use serde::{Deserialize, Serialize};

use std::fmt;

use super::hashing::HashEngine;
use super::timestamp::Timestamp;
use super::transaction::Transaction;

/// Previous-hash sentinel carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Represents a block in the chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Position of the block in the chain
    pub index: u64,

    /// Transactions sealed into this block, in insertion order
    pub transactions: Vec<Transaction>,

    /// Time the candidate block was created
    pub timestamp: Timestamp,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work counter
    pub nonce: u64,

    /// Leading zero hex digits required when this block was mined.
    /// Not part of the hashed fields.
    pub difficulty: u32,

    /// Hash of the current block
    pub hash: String,
}

/// Renders the hashes of a transaction list back to back
struct TransactionHashes<'a>(&'a [Transaction]);

impl fmt::Display for TransactionHashes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for transaction in self.0 {
            f.write_str(&transaction.hash)?;
        }
        Ok(())
    }
}

impl Block {
    /// Creates a candidate block with nonce 0
    ///
    /// # Arguments
    ///
    /// * `index` - The position the block will occupy in the chain
    /// * `transactions` - The transactions to seal, order is significant
    /// * `previous_hash` - The hash of the current chain tip
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        Self::with_timestamp(index, transactions, previous_hash, Timestamp::now())
    }

    /// Creates a candidate block with an explicit timestamp
    pub fn with_timestamp(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        timestamp: Timestamp,
    ) -> Self {
        let block = Block {
            index,
            transactions,
            timestamp,
            previous_hash,
            nonce: 0,
            difficulty: 0,
            hash: String::new(),
        };

        let hash = block.calculate_hash();

        Block { hash, ..block }
    }

    /// Creates the first block of a chain
    pub fn genesis() -> Self {
        Block::new(0, Vec::new(), GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Calculates the hash for the current nonce
    pub fn calculate_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    /// Calculates the hash the block would have with the given nonce
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        HashEngine::new()
            .field(&self.timestamp)
            .field(&self.previous_hash)
            .field(&self.index)
            .field(&nonce)
            .field(&TransactionHashes(&self.transactions))
            .finish()
    }

    /// Checks whether the stored hash has `difficulty` leading zero hex digits
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        is_valid_target_hash(&self.hash, difficulty)
    }

    /// Checks every transaction signature in the block
    pub fn verify_transactions(&self) -> bool {
        self.transactions.iter().all(Transaction::verify_transaction)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}

/// Returns true if `hash` starts with `difficulty` '0' characters
pub fn is_valid_target_hash(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}
