//! Ledger configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::path::Path;

use crate::blockchain::hashing::HASH_HEX_LEN;
use crate::blockchain::mining::MinerKind;

pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid difficulty {0}: must be between 1 and {max}", max = HASH_HEX_LEN)]
    InvalidDifficulty(u32),

    #[error("Invalid batch size: must be at least 1")]
    InvalidBatchSize,

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters injected into a [`Ledger`](crate::blockchain::Ledger)
///
/// ```toml
/// difficulty = 4
/// batch_size = 3
/// miner = "sequential"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero hex digits a block hash must have
    pub difficulty: u32,

    /// Pending transactions that trigger sealing a block
    pub batch_size: usize,

    pub miner: MinerKind,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            difficulty: DEFAULT_DIFFICULTY,
            batch_size: DEFAULT_BATCH_SIZE,
            miner: MinerKind::default(),
        }
    }
}

impl LedgerConfig {
    pub fn new(difficulty: u32, batch_size: usize) -> Self {
        LedgerConfig {
            difficulty,
            batch_size,
            ..Default::default()
        }
    }

    pub fn with_miner(mut self, miner: MinerKind) -> Self {
        self.miner = miner;
        self
    }

    /// Parses and validates a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_difficulty(self.difficulty)?;

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        Ok(())
    }
}

pub(crate) fn validate_difficulty(difficulty: u32) -> Result<(), ConfigError> {
    if difficulty == 0 || difficulty as usize > HASH_HEX_LEN {
        return Err(ConfigError::InvalidDifficulty(difficulty));
    }
    Ok(())
}
