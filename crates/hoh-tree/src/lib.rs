//! # hoh-tree
//!
//! Concurrent ordered set of `i64` built as an unbalanced binary search
//! tree with one lock per node.
//!
//! Each implementation piece:
//! - Follows strict hand-over-hand (lock coupling) traversal, top-down only
//! - Reports its observable state through `DstTestableSet` for DST runs
//! - Has loom tests for thread interleavings (under `#[cfg(loom)]`)
//!
//! # Lock Strategies
//!
//! - `ReaderWriterLock`: concurrent readers, exclusive writer, one per node
//! - `ExclusiveLock`: readers block each other, one per node
//! - `SharedExclusiveLock`: one re-entrant mutex shared by every node
//!
//! ```rust
//! use hoh_tree::{LockCoupledTree, ReaderWriterLock};
//!
//! let tree = LockCoupledTree::new(ReaderWriterLock::new());
//! for v in [5, 2, 8, 1, 3, 7, 9] {
//!     tree.insert(v);
//! }
//! assert!(tree.remove(5));
//! assert_eq!(tree.root_value(), Some(7));
//! assert_eq!(tree.keys(), vec![1, 2, 3, 7, 8, 9]);
//! ```

pub mod config;
pub mod error;
pub mod lock;
mod node;
pub mod tree;

pub use config::{LockKind, TreeConfig};
pub use error::ConfigError;
#[cfg(loom)]
pub use lock::LoomSpinLock;
pub use lock::{AnyLock, ExclusiveLock, LockStrategy, ReaderWriterLock, SharedExclusiveLock};
pub use tree::{Audit, Insertion, LockCoupledTree};
