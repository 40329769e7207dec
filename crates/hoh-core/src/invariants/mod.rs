//! Invariant traits for lock-coupled concurrent structures.
//!
//! - `ordered_set`: ordered integer sets backed by search trees
//!   (SortedOrder, BoundsRespected, NoLostKeys, NoPhantomKeys)

pub mod ordered_set;

pub use ordered_set::{SetProperties, SetPropertyChecker};
