//! Configuration errors.
//!
//! Tree operations themselves never fail: membership results are plain
//! booleans and lock acquisition blocks instead of erroring.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown lock kind: {0:?} (expected reader-writer, mutex or shared-mutex)")]
    UnknownLockKind(String),
}
