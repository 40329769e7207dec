//! Bulk insert and load driver for `hoh_tree::LockCoupledTree`.
//!
//! Each round builds a fresh tree, pre-seeds its top levels, then splits
//! the key range `1..=2^N` across worker threads that insert in a chosen
//! order. With `--load`, one reader looping `contains` and one remover
//! looping `remove` run against the lower half of the range until the
//! inserts finish.

pub mod config;
pub mod error;
pub mod runner;
pub mod workload;

pub use config::{BenchConfig, InsertPattern, RANGE_EXPONENT_MAX, WORKERS_COUNT_MAX};
pub use error::BenchError;
pub use runner::{run_round, RoundReport};
