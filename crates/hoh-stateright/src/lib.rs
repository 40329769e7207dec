//! # hoh-stateright
//!
//! Stateright model of the lock-coupling protocol used by `hoh-tree`.
//!
//! The model runs a handful of concurrent operations against a small tree
//! and explores every schedule of their lock acquisitions, checking mutual
//! exclusion, memory safety of unlinking, search order, deadlock-freedom
//! and serializable results.
//!
//! ## Usage
//!
//! ```ignore
//! use hoh_stateright::{CouplingModel, SetOp};
//! use hoh_tree::LockKind;
//! use stateright::{Checker, Model};
//!
//! CouplingModel::new(LockKind::ReaderWriter, vec![5, 2, 8], vec![SetOp::Remove(5), SetOp::Insert(7)])
//!     .checker()
//!     .spawn_bfs()
//!     .join()
//!     .assert_properties();
//! ```
//!
//! ## Modules
//!
//! - `coupling`: the state machine and its properties

pub mod coupling;

pub use coupling::{CouplingModel, CouplingState, LockState, NodeState, Pc, SetOp, Side, Step, ThreadState};
