//! Fault injection for concurrent ordered sets.
//!
//! DST injects faults at OPERATION BOUNDARIES, not inside a locked section.
//! The set implementation stays pure; faults happen in the test harness.
//!
//! Loom covers the lock-coupling races inside an operation. DST covers
//! what happens around operations:
//!
//! - a caller that never issues an operation (fault before it)
//! - a caller that never observes a result (fault after it; the set has
//!   changed and the model must follow)
//! - agreement of every observed result with a `BTreeSet` model
//!
//! ```text
//! before-op fault? --no--> set.op(v) --> compare with model --> after-op fault?
//!       |                                                          |
//!   skip op, model unchanged                         model updated, result dropped
//! ```

use std::collections::BTreeSet;

use hoh_core::{SetProperties, TreeIssue};
use tracing::warn;

use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;

/// Fault injection points (between operations, not inside).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Before starting an operation
    BeforeOperation,
    /// After operation completes (before returning to caller)
    AfterOperation,
}

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// Caller "crashes" (operation abandoned or result never observed)
    ThreadCrash,
    /// Caller is slow to issue the operation; the runner's simulated
    /// clock advances and the operation still runs
    Delay,
}

/// What a set exposes to the DST runner. Implementations need no
/// knowledge of faults.
pub trait DstTestableSet: Send + Sync {
    /// Insert `value`; `true` if it was not present before.
    fn insert_new(&self, value: i64) -> bool;
    fn contains(&self, value: i64) -> bool;
    /// Remove `value`; `true` if it was present.
    fn remove(&self, value: i64) -> bool;
    /// All keys in in-order traversal order.
    fn keys(&self) -> Vec<i64>;
    /// Structural bound violations, for structures that can report them.
    fn bound_violations(&self) -> Vec<TreeIssue> {
        Vec::new()
    }
}

/// DST test runner for ordered sets.
///
/// Wraps a set implementation, injects faults at operation boundaries,
/// and checks every result against a `BTreeSet` model.
pub struct DstRunner<S> {
    set: S,
    fault_injector: FaultInjector,
    seed: u64,
    model: BTreeSet<i64>,
    /// Simulated microseconds spent in injected delays
    now_us: u64,
    // Statistics
    operations_count: u64,
    faults_injected: u64,
    abandoned_operations: u64,
    delays_injected: u64,
    mismatches: Vec<String>,
}

impl<S: DstTestableSet> DstRunner<S> {
    /// Create a new DST runner with the default fault configuration.
    pub fn new(seed: u64, set: S) -> Self {
        Self::with_fault_config(seed, set, FaultConfig::default())
    }

    pub fn with_fault_config(seed: u64, set: S, config: FaultConfig) -> Self {
        Self {
            set,
            fault_injector: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), config),
            seed,
            model: BTreeSet::new(),
            now_us: 0,
            operations_count: 0,
            faults_injected: 0,
            abandoned_operations: 0,
            delays_injected: 0,
            mismatches: Vec::new(),
        }
    }

    /// Get the seed for reproduction.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn set(&self) -> &S {
        &self.set
    }

    pub fn model(&self) -> &BTreeSet<i64> {
        &self.model
    }

    /// Simulated time consumed by delays so far.
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    /// Insert with fault injection at boundaries.
    pub fn insert(&mut self, value: i64) -> Result<bool, FaultType> {
        self.before_operation()?;

        let inserted = self.set.insert_new(value);
        self.operations_count += 1;
        let expected = self.model.insert(value);
        self.compare("insert", value, expected, inserted);

        self.after_operation()?;
        Ok(inserted)
    }

    /// Remove with fault injection at boundaries.
    pub fn remove(&mut self, value: i64) -> Result<bool, FaultType> {
        self.before_operation()?;

        let removed = self.set.remove(value);
        self.operations_count += 1;
        let expected = self.model.remove(&value);
        self.compare("remove", value, expected, removed);

        self.after_operation()?;
        Ok(removed)
    }

    /// Membership test with fault injection at boundaries.
    pub fn contains(&mut self, value: i64) -> Result<bool, FaultType> {
        self.before_operation()?;

        let found = self.set.contains(value);
        self.operations_count += 1;
        let expected = self.model.contains(&value);
        self.compare("contains", value, expected, found);

        self.after_operation()?;
        Ok(found)
    }

    /// Before the operation starts: a crash here means it never happens,
    /// a delay only holds it back.
    fn before_operation(&mut self) -> Result<(), FaultType> {
        match self.maybe_inject_fault(FaultPoint::BeforeOperation) {
            Some(FaultType::ThreadCrash) => {
                self.abandoned_operations += 1;
                Err(FaultType::ThreadCrash)
            }
            _ => Ok(()),
        }
    }

    /// After the operation: the effect IS applied, the caller just never sees it.
    fn after_operation(&mut self) -> Result<(), FaultType> {
        match self.maybe_inject_fault(FaultPoint::AfterOperation) {
            Some(FaultType::ThreadCrash) => {
                self.abandoned_operations += 1;
                Err(FaultType::ThreadCrash)
            }
            _ => Ok(()),
        }
    }

    fn maybe_inject_fault(&mut self, point: FaultPoint) -> Option<FaultType> {
        if self.fault_injector.should_fail() {
            self.faults_injected += 1;
            return Some(FaultType::ThreadCrash);
        }
        // A completed operation cannot be issued late.
        if point == FaultPoint::AfterOperation {
            return None;
        }
        let delay = self.fault_injector.delay_us()?;
        self.delays_injected += 1;
        self.now_us += delay;
        Some(FaultType::Delay)
    }

    fn compare(&mut self, op: &str, value: i64, expected: bool, actual: bool) {
        if expected != actual {
            warn!(seed = self.seed, op, value, expected, actual, "result disagrees with model");
            self.mismatches.push(format!(
                "{}({}) returned {} but model expected {}",
                op, value, actual, expected
            ));
        }
    }

    /// Results that disagreed with the model.
    pub fn mismatches(&self) -> &[String] {
        &self.mismatches
    }

    /// Check NoLostKeys and NoPhantomKeys together.
    pub fn check_contents_match(&self) -> bool {
        let keys: BTreeSet<i64> = self.set.keys().into_iter().collect();
        keys == self.model
    }

    /// Check SortedOrder.
    pub fn check_sorted(&self) -> bool {
        self.set.keys().windows(2).all(|w| w[0] < w[1])
    }

    /// Get statistics.
    pub fn stats(&self) -> DstStats {
        DstStats {
            seed: self.seed,
            operations_count: self.operations_count,
            faults_injected: self.faults_injected,
            abandoned_operations: self.abandoned_operations,
            delays_injected: self.delays_injected,
            delayed_us: self.now_us,
        }
    }
}

impl<S: DstTestableSet> SetProperties for DstRunner<S> {
    fn expected_keys(&self) -> BTreeSet<i64> {
        self.model.clone()
    }

    fn in_order_keys(&self) -> Vec<i64> {
        self.set.keys()
    }

    fn bound_violations(&self) -> Vec<TreeIssue> {
        self.set.bound_violations()
    }
}

/// Statistics from DST run.
#[derive(Debug, Clone)]
pub struct DstStats {
    pub seed: u64,
    pub operations_count: u64,
    /// Crashes injected at either boundary
    pub faults_injected: u64,
    pub abandoned_operations: u64,
    pub delays_injected: u64,
    pub delayed_us: u64,
}

impl DstStats {
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} ops={} faults={} abandoned={} delays={} ({}us)",
            self.seed,
            self.operations_count,
            self.faults_injected,
            self.abandoned_operations,
            self.delays_injected,
            self.delayed_us
        )
    }
}

/// Run a DST scenario.
///
/// Operations are executed with fault injection. Invariants checked at end.
pub fn run_dst_scenario<S: DstTestableSet>(seed: u64, set: S, operations: Vec<DstOp>) -> DstResult {
    let mut runner = DstRunner::new(seed, set);
    let mut fault_errors = Vec::new();

    for op in operations {
        let result = match op {
            DstOp::Insert(v) => runner.insert(v).map(|_| ()),
            DstOp::Remove(v) => runner.remove(v).map(|_| ()),
            DstOp::Contains(v) => runner.contains(v).map(|_| ()),
        };

        // Faults are expected - they're part of the test
        if let Err(fault) = result {
            fault_errors.push(format!("{:?}", fault));
        }
    }

    let contents_match = runner.check_contents_match();
    let sorted = runner.check_sorted();
    let mismatches = runner.mismatches().to_vec();

    DstResult {
        passed: contents_match && sorted && mismatches.is_empty(),
        contents_match,
        sorted,
        mismatches,
        stats: runner.stats(),
        fault_errors,
    }
}

/// DST operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstOp {
    Insert(i64),
    Remove(i64),
    Contains(i64),
}

impl DstOp {
    /// A random operation over keys in `0..key_space`.
    pub fn random(rng: &mut DeterministicRng, key_space: i64) -> Self {
        debug_assert!(key_space > 0, "Key space must be non-empty");
        let key = rng.gen_range(0..key_space);
        match rng.gen_range(0..3_u8) {
            0 => DstOp::Insert(key),
            1 => DstOp::Remove(key),
            _ => DstOp::Contains(key),
        }
    }
}

/// DST result.
#[derive(Debug)]
pub struct DstResult {
    pub passed: bool,
    pub contents_match: bool,
    pub sorted: bool,
    pub mismatches: Vec<String>,
    pub stats: DstStats,
    pub fault_errors: Vec<String>,
}

impl DstResult {
    pub fn format(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut result = format!("[{}] {}", status, self.stats.format());

        if !self.contents_match {
            result.push_str("\n  VIOLATION: NoLostKeys/NoPhantomKeys");
        }
        if !self.sorted {
            result.push_str("\n  VIOLATION: SortedOrder");
        }
        for mismatch in &self.mismatches {
            result.push_str(&format!("\n  MISMATCH: {}", mismatch));
        }

        result
    }
}
