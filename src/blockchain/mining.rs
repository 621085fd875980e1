use log::{debug, warn};
use serde::{Deserialize, Serialize};

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::block::{is_valid_target_hash, Block};
use super::hashing::HASH_HEX_LEN;

/// How often (in attempts) the sequential search polls its cancel flag
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Nonces handed to each worker thread per parallel window
#[cfg(feature = "rayon")]
const PARALLEL_CHUNK: u64 = 4096;

/// Which search the miner runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerKind {
    /// One thread, ascending nonces
    #[default]
    Sequential,

    /// Worker threads over disjoint nonce windows (needs the `rayon` feature)
    Parallel,
}

/// Outcome of a successful search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningStats {
    /// The winning nonce
    pub nonce: u64,

    /// Nonces covered from the starting nonce up to and including the winner
    pub attempts: u64,

    pub elapsed: Duration,
}

#[derive(Debug)]
struct Solution {
    nonce: u64,
    hash: String,
    attempts: u64,
}

#[derive(Debug)]
struct Cancelled;

/// Searches for the lowest nonce whose block hash meets a difficulty target
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofOfWorkMiner {
    kind: MinerKind,
}

impl ProofOfWorkMiner {
    pub fn new(kind: MinerKind) -> Self {
        #[cfg(not(feature = "rayon"))]
        {
            if kind == MinerKind::Parallel {
                warn!(
                    target: "mining",
                    "Parallel mining requested without the rayon feature, searching sequentially"
                );
            }
        }

        ProofOfWorkMiner { kind }
    }

    pub fn sequential() -> Self {
        ProofOfWorkMiner::new(MinerKind::Sequential)
    }

    pub fn kind(&self) -> MinerKind {
        self.kind
    }

    /// Mines the block in place
    ///
    /// Starts at `block.nonce` and stops at the first nonce, in ascending
    /// order, whose hash has `difficulty` leading zero hex digits. On return
    /// the block's `nonce`, `hash` and `difficulty` hold the solution. There
    /// is no deadline.
    pub fn mine(&self, block: &mut Block, difficulty: u32) -> MiningStats {
        match self.run(block, difficulty, || Ok::<(), Infallible>(())) {
            Ok(stats) => stats,
            Err(never) => match never {},
        }
    }

    /// Mines the block in place unless `cancel` is raised first
    ///
    /// Returns `None` and leaves the block untouched when cancelled.
    pub fn mine_cancellable(
        &self,
        block: &mut Block,
        difficulty: u32,
        cancel: &AtomicBool,
    ) -> Option<MiningStats> {
        let check = || {
            if cancel.load(Ordering::Relaxed) {
                Err(Cancelled)
            } else {
                Ok(())
            }
        };

        match self.run(block, difficulty, check) {
            Ok(stats) => Some(stats),
            Err(Cancelled) => {
                warn!(target: "mining", "Mining of block {} cancelled", block.index);
                None
            }
        }
    }

    fn run<E>(
        &self,
        block: &mut Block,
        difficulty: u32,
        check: impl FnMut() -> Result<(), E>,
    ) -> Result<MiningStats, E> {
        let difficulty = clamp_difficulty(difficulty);

        if difficulty >= 8 {
            warn!(
                target: "mining",
                "Difficulty {} may take a very long time to solve", difficulty
            );
        }

        let started = Instant::now();
        let solution = match self.kind {
            MinerKind::Sequential => sequential_search(block, difficulty, check)?,
            MinerKind::Parallel => parallel_search(block, difficulty, check)?,
        };

        block.nonce = solution.nonce;
        block.hash = solution.hash;
        block.difficulty = difficulty;

        let stats = MiningStats {
            nonce: solution.nonce,
            attempts: solution.attempts,
            elapsed: started.elapsed(),
        };
        debug!(target: "mining", "Block {} solved: {:?}", block.index, stats);

        Ok(stats)
    }
}

/// Caps the target at the digest length, beyond which no hash can qualify
fn clamp_difficulty(difficulty: u32) -> u32 {
    let max = HASH_HEX_LEN as u32;
    if difficulty > max {
        warn!(
            target: "mining",
            "Difficulty {} exceeds the {} hex digits of a hash, using {}", difficulty, max, max
        );
        return max;
    }
    difficulty
}

fn sequential_search<E>(
    block: &Block,
    difficulty: u32,
    mut check: impl FnMut() -> Result<(), E>,
) -> Result<Solution, E> {
    let mut nonce = block.nonce;
    let mut attempts = 0u64;

    loop {
        if attempts % CANCEL_CHECK_INTERVAL == 0 {
            check()?;
        }

        let hash = block.hash_with_nonce(nonce);
        attempts += 1;

        if is_valid_target_hash(&hash, difficulty) {
            return Ok(Solution {
                nonce,
                hash,
                attempts,
            });
        }

        nonce = nonce.wrapping_add(1);
    }
}

/// Scans consecutive windows of nonces across the rayon pool
///
/// Within a window `find_first` keeps the lowest matching nonce, and windows
/// are visited in ascending order, so the result equals the sequential one.
#[cfg(feature = "rayon")]
fn parallel_search<E>(
    block: &Block,
    difficulty: u32,
    mut check: impl FnMut() -> Result<(), E>,
) -> Result<Solution, E> {
    use rayon::prelude::*;

    let window = rayon::current_num_threads().max(1) as u64 * PARALLEL_CHUNK;
    let mut start = block.nonce;
    let mut attempts = 0u64;

    loop {
        check()?;

        let last = start.saturating_add(window - 1);
        let found = (start..=last)
            .into_par_iter()
            .map(|nonce| (nonce, block.hash_with_nonce(nonce)))
            .find_first(|(_, hash)| is_valid_target_hash(hash, difficulty));

        match found {
            Some((nonce, hash)) => {
                return Ok(Solution {
                    nonce,
                    hash,
                    attempts: attempts + (nonce - start) + 1,
                });
            }
            None => {
                attempts += last - start + 1;
                start = last.wrapping_add(1);
            }
        }
    }
}

#[cfg(not(feature = "rayon"))]
fn parallel_search<E>(
    block: &Block,
    difficulty: u32,
    check: impl FnMut() -> Result<(), E>,
) -> Result<Solution, E> {
    sequential_search(block, difficulty, check)
}
