//! Command-line configuration.

use clap::{Parser, ValueEnum};
use serde::Serialize;

use hoh_tree::LockKind;

use crate::error::BenchError;

/// Maximum insert worker threads.
pub const WORKERS_COUNT_MAX: usize = 64;

/// Largest key range is 1..=2^RANGE_EXPONENT_MAX.
pub const RANGE_EXPONENT_MAX: u32 = 26;

/// Order in which each worker inserts its share of the key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertPattern {
    /// Midpoints first, halving the stride each level; keeps the tree shallow
    Balanced,
    /// Uniformly random keys from the worker's sub-range
    Random,
    /// Ascending; every worker builds a list-shaped spine
    Sequential,
}

/// Time bulk inserts into a lock-coupled tree, optionally under
/// concurrent lookup and removal load.
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "hoh-bench")]
#[command(about = "Bulk insert and lookup/removal load driver for the lock-coupled tree")]
pub struct BenchConfig {
    /// Lock strategy: reader-writer, mutex or shared-mutex.
    #[arg(long, default_value_t = LockKind::ReaderWriter)]
    pub lock: LockKind,

    /// Insert the keys 1..=2^N.
    #[arg(long, default_value_t = 16)]
    pub range_exponent: u32,

    /// Insert worker threads; the key range is split evenly between them.
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Insert order within each worker.
    #[arg(long, value_enum, default_value_t = InsertPattern::Balanced)]
    pub pattern: InsertPattern,

    /// Run one looping reader and one looping remover until inserts finish.
    #[arg(long)]
    pub load: bool,

    /// Pause between load operations, in microseconds.
    #[arg(long, default_value_t = 1_000)]
    pub load_pause_us: u64,

    /// Number of rounds, each on a fresh tree.
    #[arg(long, default_value_t = 1)]
    pub rounds: u64,

    /// Seed for random keys (random if not set).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print one JSON report per round instead of a text line.
    #[arg(long)]
    pub json: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            lock: LockKind::ReaderWriter,
            range_exponent: 16,
            workers: 4,
            pattern: InsertPattern::Balanced,
            load: false,
            load_pause_us: 1_000,
            rounds: 1,
            seed: None,
            json: false,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.workers == 0 || self.workers > WORKERS_COUNT_MAX {
            return Err(BenchError::InvalidConfig(format!(
                "workers must be in 1..={}, got {}",
                WORKERS_COUNT_MAX, self.workers
            )));
        }
        if self.range_exponent == 0 || self.range_exponent > RANGE_EXPONENT_MAX {
            return Err(BenchError::InvalidConfig(format!(
                "range_exponent must be in 1..={}, got {}",
                RANGE_EXPONENT_MAX, self.range_exponent
            )));
        }
        if self.key_count() < self.workers as i64 {
            return Err(BenchError::InvalidConfig(format!(
                "{} keys cannot be split across {} workers",
                self.key_count(),
                self.workers
            )));
        }
        if self.rounds == 0 {
            return Err(BenchError::InvalidConfig("rounds must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Number of keys in the insert range.
    pub fn key_count(&self) -> i64 {
        1_i64 << self.range_exponent
    }
}
