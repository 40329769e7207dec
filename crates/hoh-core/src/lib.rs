//! # hoh-core
//!
//! Core types and invariants for lock-coupled concurrent structures.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - Invariant traits for each data structure (e.g., `SetProperties`)
//!
//! Implementations expose their observable state through the invariant
//! traits; the checkers never reach into implementation internals.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, StateSnapshot, ThreadAction, TreeIssue};
pub use invariants::{SetProperties, SetPropertyChecker};
pub use property::{PropertyChecker, PropertyResult};
