//! Ordered set invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | SortedOrder | In-order traversal is strictly increasing |
//! | BoundsRespected | Every value lies inside the interval its ancestors imply |
//! | NoLostKeys | Every live key is reachable |
//! | NoPhantomKeys | Every reachable key is live |

use std::collections::BTreeSet;

use crate::counterexample::{Counterexample, StateSnapshot, TreeIssue};
use crate::property::{PropertyChecker, PropertyResult};

/// Properties that any concurrent ordered set must satisfy.
///
/// `expected_keys` is the ground truth kept by whoever drives the
/// structure; the other two methods describe what the structure
/// actually holds.
pub trait SetProperties {
    /// Keys that should currently be present.
    fn expected_keys(&self) -> BTreeSet<i64>;

    /// All reachable keys, in in-order traversal order.
    fn in_order_keys(&self) -> Vec<i64>;

    /// Nodes whose values escape the bounds implied by their ancestors.
    fn bound_violations(&self) -> Vec<TreeIssue>;
}

/// Property checker for ordered set implementations.
pub struct SetPropertyChecker<'a, T: SetProperties> {
    set: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: SetProperties> SetPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(set: &'a T) -> Self {
        Self {
            set,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    fn counterexample(&self) -> Counterexample {
        match self.dst_seed {
            Some(seed) => Counterexample::with_seed(seed),
            None => Counterexample::new(),
        }
    }

    fn check_sorted_order(&self, keys: &[i64]) -> PropertyResult {
        for (i, pair) in keys.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return PropertyResult::fail(
                    "SortedOrder",
                    format!(
                        "Keys not strictly increasing: {} >= {} at indices {}, {}",
                        pair[0],
                        pair[1],
                        i,
                        i + 1
                    ),
                    None,
                );
            }
        }

        PropertyResult::pass("SortedOrder")
    }

    fn check_bounds_respected(&self) -> PropertyResult {
        let violations = self.set.bound_violations();
        if violations.is_empty() {
            return PropertyResult::pass("BoundsRespected");
        }

        let mut ce = self.counterexample();
        let message = format!("{} node(s) out of bounds, first: {}", violations.len(), violations[0]);
        for issue in violations {
            ce.add_tree_issue(issue);
        }
        PropertyResult::fail("BoundsRespected", message, Some(ce))
    }

    fn check_no_lost_keys(&self, expected: &BTreeSet<i64>, reachable: &BTreeSet<i64>) -> PropertyResult {
        let lost: Vec<i64> = expected.difference(reachable).copied().collect();
        if lost.is_empty() {
            return PropertyResult::pass("NoLostKeys");
        }

        let mut ce = self.counterexample();
        ce.add_state(StateSnapshot {
            step: 1,
            summary: format!("{} key(s) lost", lost.len()),
            counts: vec![("expected_len", expected.len()), ("reachable_len", reachable.len())],
        });
        for &key in &lost {
            ce.add_tree_issue(TreeIssue::LostKey { key });
        }
        PropertyResult::fail(
            "NoLostKeys",
            format!("Key {} is live but not reachable from the root", lost[0]),
            Some(ce),
        )
    }

    fn check_no_phantom_keys(&self, expected: &BTreeSet<i64>, reachable: &BTreeSet<i64>) -> PropertyResult {
        match reachable.difference(expected).next() {
            None => PropertyResult::pass("NoPhantomKeys"),
            Some(&key) => {
                let mut ce = self.counterexample();
                ce.add_tree_issue(TreeIssue::PhantomKey { key });
                PropertyResult::fail(
                    "NoPhantomKeys",
                    format!("Key {} is reachable but should be absent", key),
                    Some(ce),
                )
            }
        }
    }
}

impl<'a, T: SetProperties> PropertyChecker for SetPropertyChecker<'a, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        let keys = self.set.in_order_keys();
        let expected = self.set.expected_keys();
        let reachable: BTreeSet<i64> = keys.iter().copied().collect();

        vec![
            self.check_sorted_order(&keys),
            self.check_bounds_respected(),
            self.check_no_lost_keys(&expected, &reachable),
            self.check_no_phantom_keys(&expected, &reachable),
        ]
    }
}
