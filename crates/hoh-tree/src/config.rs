//! Tree configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which `LockStrategy` guards the nodes of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockKind {
    /// Shared readers, exclusive writer, one lock per node
    #[default]
    ReaderWriter,
    /// Exclusive for reads and writes, one lock per node
    #[serde(rename = "mutex")]
    Exclusive,
    /// One exclusive lock shared by every node
    #[serde(rename = "shared-mutex")]
    SharedExclusive,
}

impl LockKind {
    pub const ALL: [LockKind; 3] = [
        LockKind::ReaderWriter,
        LockKind::Exclusive,
        LockKind::SharedExclusive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::ReaderWriter => "reader-writer",
            LockKind::Exclusive => "mutex",
            LockKind::SharedExclusive => "shared-mutex",
        }
    }

    /// Whether every node shares one lock.
    pub fn is_coarse(&self) -> bool {
        matches!(self, LockKind::SharedExclusive)
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reader-writer" | "rw" | "rwlock" => Ok(LockKind::ReaderWriter),
            "mutex" | "exclusive" => Ok(LockKind::Exclusive),
            "shared-mutex" | "shared" | "coarse" => Ok(LockKind::SharedExclusive),
            _ => Err(ConfigError::UnknownLockKind(s.to_string())),
        }
    }
}

/// Construction-time settings for `LockCoupledTree::from_config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub lock: LockKind,
}

impl TreeConfig {
    pub fn with_lock(lock: LockKind) -> Self {
        Self { lock }
    }
}
