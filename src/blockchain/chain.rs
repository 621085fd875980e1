use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::block::Block;
use super::mining::{MiningStats, ProofOfWorkMiner};
use super::transaction::Transaction;
use crate::config::{self, ConfigError, LedgerConfig};

/// Reasons a chain fails validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainValidationError {
    #[error("Genesis block is missing or malformed")]
    GenesisMismatch,

    #[error("Block at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: u64 },

    #[error("Block {index} does not link to its predecessor: expected {expected}, found {found}")]
    ChainLinkageViolation {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("Block {index} hash does not match its contents")]
    HashMismatch { index: u64 },

    #[error("Block {index} hash does not meet difficulty {difficulty}")]
    InsufficientProofOfWork { index: u64, difficulty: u32 },

    #[error("Block {index} contains invalid transaction {hash}")]
    InvalidTransaction { index: u64, hash: String },
}

/// Where the ledger is in its batching cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// No pending transactions
    Empty,

    /// Fewer than `batch_size` transactions pending
    Accumulating { pending: usize },

    /// A full batch is waiting to be sealed
    Ready { pending: usize },

    /// A block is being sealed and mined
    Mining,
}

/// The ledger: an ordered chain of mined blocks plus a queue of pending
/// transactions
///
/// Cloning is cheap and clones share the same chain and queue.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// The chain of blocks, never empty
    chain: Arc<Mutex<Vec<Block>>>,

    /// Transactions waiting for the next block, oldest first
    pending_transactions: Arc<Mutex<VecDeque<Transaction>>>,

    /// Held for the whole seal, mine and append sequence
    seal_lock: Arc<Mutex<()>>,

    /// Mining difficulty (number of leading zeros required in hash)
    difficulty: Arc<AtomicU32>,

    /// Lowest difficulty ever configured, the floor for validation
    min_difficulty: Arc<AtomicU32>,

    /// Pending transactions that trigger a new block
    batch_size: usize,

    miner: ProofOfWorkMiner,
}

impl Ledger {
    /// Creates a ledger holding only the genesis block
    pub fn new(config: LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    /// Creates a ledger with the default difficulty and batch size
    pub fn with_defaults() -> Self {
        Self::from_valid_config(LedgerConfig::default())
    }

    fn from_valid_config(config: LedgerConfig) -> Self {
        let genesis = Block::genesis();
        info!("Genesis block created");

        Ledger {
            chain: Arc::new(Mutex::new(vec![genesis])),
            pending_transactions: Arc::new(Mutex::new(VecDeque::new())),
            seal_lock: Arc::new(Mutex::new(())),
            difficulty: Arc::new(AtomicU32::new(config.difficulty)),
            min_difficulty: Arc::new(AtomicU32::new(config.difficulty)),
            batch_size: config.batch_size,
            miner: ProofOfWorkMiner::new(config.miner),
        }
    }

    /// Gets the last block in the chain
    pub fn get_latest_block(&self) -> Block {
        let chain = self.chain.lock();
        chain[chain.len() - 1].clone()
    }

    /// Adds a transaction and mines a block once a batch is full
    ///
    /// When the queue reaches `batch_size` this call seals the oldest
    /// `batch_size` transactions into a block, mines it and appends it, and
    /// repeats until fewer than `batch_size` remain. It may block for as long
    /// as mining takes.
    ///
    /// # Returns
    ///
    /// The last block appended, if this call completed a batch
    pub fn add_transaction(&self, transaction: Transaction) -> Option<Block> {
        if !matches!(self.enqueue_transaction(transaction), BatchState::Ready { .. }) {
            return None;
        }

        let _sealing = self.seal_lock.lock();
        let mut appended = None;
        while let Some(block) = self.seal_locked(true) {
            appended = Some(block);
        }
        appended
    }

    /// Adds a transaction without ever mining
    ///
    /// Callers that want to control when mining happens pair this with
    /// [`seal_and_mine`](Self::seal_and_mine).
    pub fn enqueue_transaction(&self, transaction: Transaction) -> BatchState {
        let mut pending = self.pending_transactions.lock();
        debug!("Queued transaction {}", transaction.hash);
        pending.push_back(transaction);
        self.state_for(pending.len())
    }

    /// Seals up to `batch_size` pending transactions into a block, mines it
    /// and appends it
    ///
    /// A partial batch is sealed as is. Returns `None` when nothing is
    /// pending.
    pub fn seal_and_mine(&self) -> Option<Block> {
        let _sealing = self.seal_lock.lock();
        self.seal_locked(false)
    }

    /// Mines whatever is pending into a new block
    pub fn add_block(&self) -> Option<Block> {
        self.seal_and_mine()
    }

    /// Runs one seal, mine and append. The caller holds `seal_lock`.
    fn seal_locked(&self, require_full_batch: bool) -> Option<Block> {
        let batch: Vec<Transaction> = {
            let mut pending = self.pending_transactions.lock();
            if pending.is_empty() || (require_full_batch && pending.len() < self.batch_size) {
                return None;
            }
            let take = pending.len().min(self.batch_size);
            pending.drain(..take).collect()
        };

        // The seal lock keeps the tip fixed until the block is appended
        let (index, previous_hash) = {
            let chain = self.chain.lock();
            (chain.len() as u64, chain[chain.len() - 1].hash.clone())
        };

        let mut block = Block::new(index, batch, previous_hash);
        debug!(
            "Sealed block {} with {} transactions",
            block.index,
            block.transactions.len()
        );

        let MiningStats {
            attempts, elapsed, ..
        } = self.miner.mine(&mut block, self.difficulty());
        info!("This took {} attempts ({:?})", attempts, elapsed);

        self.chain.lock().push(block.clone());
        info!("Block {} has been added to the chain", block.index);

        Some(block)
    }

    /// Gets the entire chain
    pub fn chain(&self) -> Vec<Block> {
        self.chain.lock().clone()
    }

    /// Number of blocks, genesis included
    pub fn chain_len(&self) -> usize {
        self.chain.lock().len()
    }

    /// Gets all pending transactions, oldest first
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.pending_transactions.lock().iter().cloned().collect()
    }

    pub fn state(&self) -> BatchState {
        if self.seal_lock.is_locked() {
            return BatchState::Mining;
        }
        self.state_for(self.pending_transactions.lock().len())
    }

    fn state_for(&self, pending: usize) -> BatchState {
        match pending {
            0 => BatchState::Empty,
            n if n < self.batch_size => BatchState::Accumulating { pending: n },
            n => BatchState::Ready { pending: n },
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty.load(Ordering::SeqCst)
    }

    /// Changes the difficulty used for blocks mined from now on
    pub fn set_difficulty(&self, difficulty: u32) -> Result<(), ConfigError> {
        config::validate_difficulty(difficulty)?;
        // Serialised with mining so the floor covers every appended block
        let _sealing = self.seal_lock.lock();
        self.difficulty.store(difficulty, Ordering::SeqCst);
        self.min_difficulty.fetch_min(difficulty, Ordering::SeqCst);
        info!("Difficulty set to {}", difficulty);
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Lowest difficulty this ledger has been configured with
    pub fn min_difficulty(&self) -> u32 {
        self.min_difficulty.load(Ordering::SeqCst)
    }

    /// Validates signatures, hashes, proof of work and linkage end to end
    pub fn validate_chain(&self) -> Result<(), ChainValidationError> {
        validate_blocks(&self.chain.lock(), self.min_difficulty())
    }

    /// Validates the chain, logging the first problem found
    pub fn is_valid(&self) -> bool {
        match self.validate_chain() {
            Ok(()) => true,
            Err(err) => {
                warn!("Chain validation failed: {}", err);
                false
            }
        }
    }
}

/// Validates a sequence of blocks starting at genesis
///
/// Every block after genesis must record a difficulty of at least
/// `min_difficulty` and its hash must meet that recorded difficulty. Stops at
/// the first violation; nothing is repaired.
pub fn validate_blocks(blocks: &[Block], min_difficulty: u32) -> Result<(), ChainValidationError> {
    let genesis = blocks.first().ok_or(ChainValidationError::GenesisMismatch)?;
    if !genesis.is_genesis()
        || !genesis.transactions.is_empty()
        || genesis.hash != genesis.calculate_hash()
    {
        return Err(ChainValidationError::GenesisMismatch);
    }

    for (position, pair) in blocks.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let position = position + 1;

        if current.index != position as u64 {
            return Err(ChainValidationError::IndexMismatch {
                position,
                index: current.index,
            });
        }

        if current.previous_hash != previous.hash {
            return Err(ChainValidationError::ChainLinkageViolation {
                index: current.index,
                expected: previous.hash.clone(),
                found: current.previous_hash.clone(),
            });
        }

        if current.hash != current.calculate_hash() {
            return Err(ChainValidationError::HashMismatch {
                index: current.index,
            });
        }

        if current.difficulty == 0
            || current.difficulty < min_difficulty
            || !current.meets_difficulty(current.difficulty)
        {
            return Err(ChainValidationError::InsufficientProofOfWork {
                index: current.index,
                difficulty: current.difficulty,
            });
        }

        if let Some(invalid) = current
            .transactions
            .iter()
            .find(|transaction| !transaction.verify_transaction())
        {
            return Err(ChainValidationError::InvalidTransaction {
                index: current.index,
                hash: invalid.hash.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Identity;

    fn ledger(difficulty: u32, batch_size: usize) -> Ledger {
        Ledger::new(LedgerConfig::new(difficulty, batch_size)).unwrap()
    }

    fn transfer(amount: f64) -> Transaction {
        let sender = Identity::generate();
        let receiver = Identity::generate();
        Transaction::new(&sender, receiver.address(), amount)
    }

    #[test]
    fn test_new_ledger() {
        let ledger = ledger(1, 2);
        let chain = ledger.chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 0);
        assert!(chain[0].is_genesis());
        assert_eq!(ledger.state(), BatchState::Empty);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(Ledger::new(LedgerConfig::new(0, 2)).is_err());
        assert!(Ledger::new(LedgerConfig::new(1, 0)).is_err());
    }

    #[test]
    fn test_accumulates_until_batch_is_full() {
        let ledger = ledger(1, 3);

        assert!(ledger.add_transaction(transfer(1.0)).is_none());
        assert!(ledger.add_transaction(transfer(2.0)).is_none());
        assert_eq!(ledger.state(), BatchState::Accumulating { pending: 2 });
        assert_eq!(ledger.chain_len(), 1);

        let block = ledger.add_transaction(transfer(3.0)).unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.transactions.len(), 3);
        assert_eq!(ledger.chain_len(), 2);
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.state(), BatchState::Empty);
    }

    #[test]
    fn test_block_indices_follow_chain_positions() {
        let ledger = ledger(1, 1);

        for _ in 0..3 {
            ledger.add_transaction(transfer(1.0));
        }

        let chain = ledger.chain();
        for (position, block) in chain.iter().enumerate() {
            assert_eq!(block.index, position as u64);
        }
        assert_eq!(ledger.get_latest_block().index, 3);
    }

    #[test]
    fn test_enqueue_does_not_mine() {
        let ledger = ledger(1, 2);

        assert_eq!(
            ledger.enqueue_transaction(transfer(1.0)),
            BatchState::Accumulating { pending: 1 }
        );
        assert_eq!(
            ledger.enqueue_transaction(transfer(2.0)),
            BatchState::Ready { pending: 2 }
        );
        assert_eq!(
            ledger.enqueue_transaction(transfer(3.0)),
            BatchState::Ready { pending: 3 }
        );
        assert_eq!(ledger.chain_len(), 1);

        // Oldest batch first, remainder stays queued
        let block = ledger.seal_and_mine().unwrap();
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[0].amount, 1.0);
        assert_eq!(ledger.pending_transactions().len(), 1);

        // Partial batch
        let block = ledger.add_block().unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].amount, 3.0);

        assert!(ledger.seal_and_mine().is_none());
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_add_transaction_seals_every_full_batch() {
        let ledger = ledger(1, 2);

        for amount in 1..=3 {
            ledger.enqueue_transaction(transfer(amount as f64));
        }

        // Four pending: both batches are mined before the call returns
        let block = ledger.add_transaction(transfer(4.0)).unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(block.transactions[1].amount, 4.0);
        assert_eq!(ledger.chain_len(), 3);
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.state(), BatchState::Empty);

        for amount in 5..=7 {
            ledger.enqueue_transaction(transfer(amount as f64));
        }
        ledger.add_transaction(transfer(8.0)).unwrap();
        ledger.enqueue_transaction(transfer(9.0));
        ledger.enqueue_transaction(transfer(10.0));
        ledger.add_transaction(transfer(11.0)).unwrap();

        // A partial batch stays queued
        let pending = ledger.pending_transactions();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount, 11.0);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_rejects_block_below_ledger_difficulty() {
        let ledger = ledger(3, 1);
        let genesis = ledger.chain().remove(0);

        let mut forged = Block::new(1, vec![transfer(1.0)], genesis.hash.clone());
        ProofOfWorkMiner::sequential().mine(&mut forged, 1);
        let forged_difficulty = forged.difficulty;

        assert_eq!(
            validate_blocks(&[genesis.clone(), forged.clone()], ledger.min_difficulty()),
            Err(ChainValidationError::InsufficientProofOfWork {
                index: 1,
                difficulty: forged_difficulty
            })
        );

        // Claiming a higher difficulty only passes if the hash really meets it
        forged.difficulty = 3;
        if !forged.hash.starts_with("000") {
            assert!(validate_blocks(&[genesis, forged], 3).is_err());
        }
    }

    #[test]
    fn test_lowered_difficulty_keeps_history_valid() {
        let ledger = ledger(2, 1);

        ledger.add_transaction(transfer(1.0));
        ledger.set_difficulty(1).unwrap();
        ledger.add_transaction(transfer(2.0));

        assert_eq!(ledger.min_difficulty(), 1);
        assert_eq!(ledger.validate_chain(), Ok(()));
        assert!(validate_blocks(&ledger.chain(), 2).is_err());
    }

    #[test]
    fn test_difficulty_change_applies_to_new_blocks() {
        let ledger = ledger(1, 1);

        ledger.add_transaction(transfer(1.0));
        ledger.set_difficulty(2).unwrap();
        ledger.add_transaction(transfer(2.0));

        let chain = ledger.chain();
        assert_eq!(chain[1].difficulty, 1);
        assert_eq!(chain[2].difficulty, 2);
        assert!(chain[2].hash.starts_with("00"));
        assert!(ledger.is_valid());

        assert!(ledger.set_difficulty(0).is_err());
        assert_eq!(ledger.difficulty(), 2);
    }

    #[test]
    fn test_detects_broken_linkage() {
        let ledger = ledger(1, 1);
        ledger.add_transaction(transfer(1.0));
        ledger.add_transaction(transfer(2.0));

        let mut blocks = ledger.chain();
        blocks[2].previous_hash = "f".repeat(64);

        assert!(matches!(
            validate_blocks(&blocks, 1),
            Err(ChainValidationError::ChainLinkageViolation { index: 2, .. })
        ));
    }

    #[test]
    fn test_detects_tampered_transaction() {
        let ledger = ledger(1, 1);
        ledger.add_transaction(transfer(1.0));

        let mut blocks = ledger.chain();
        blocks[1].transactions[0].amount = 500.0;

        // Only the transaction check notices: its hash field is unchanged
        assert!(matches!(
            validate_blocks(&blocks, 1),
            Err(ChainValidationError::InvalidTransaction { index: 1, .. })
        ));
    }

    #[test]
    fn test_detects_tampered_block_hash() {
        let ledger = ledger(1, 1);
        ledger.add_transaction(transfer(1.0));

        let mut blocks = ledger.chain();
        blocks[1].nonce += 1;

        assert_eq!(
            validate_blocks(&blocks, 1),
            Err(ChainValidationError::HashMismatch { index: 1 })
        );
    }

    #[test]
    fn test_detects_bad_index_and_genesis() {
        let ledger = ledger(1, 1);
        ledger.add_transaction(transfer(1.0));

        let mut blocks = ledger.chain();
        blocks[1].index = 0;
        assert_eq!(
            validate_blocks(&blocks, 1),
            Err(ChainValidationError::IndexMismatch {
                position: 1,
                index: 0
            })
        );

        assert_eq!(validate_blocks(&[], 1), Err(ChainValidationError::GenesisMismatch));

        let mut blocks = ledger.chain();
        blocks[0].previous_hash = "1".to_string();
        assert_eq!(validate_blocks(&blocks, 1), Err(ChainValidationError::GenesisMismatch));
    }

    #[test]
    fn test_detects_insufficient_work() {
        let ledger = ledger(1, 1);
        ledger.add_transaction(transfer(1.0));

        let mut blocks = ledger.chain();
        // Claim more work than was done
        blocks[1].difficulty = 64;

        assert!(matches!(
            validate_blocks(&blocks, 1),
            Err(ChainValidationError::InsufficientProofOfWork { index: 1, difficulty: 64 })
        ));
    }
}
