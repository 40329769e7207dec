//! Key generation for insert workers.

use std::collections::VecDeque;
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::InsertPattern;

/// Levels of the full-range balanced order inserted before workers start,
/// so that worker sub-ranges hang off an already shallow top.
pub const SEED_LEVELS: u32 = 4;

/// Midpoints of `range` in breadth-first order: the middle, then the
/// middles of each half, and so on. Inserting in this order builds a
/// tree of minimal height.
pub fn balanced_order(range: RangeInclusive<i64>) -> Vec<i64> {
    let (lo, hi) = range.into_inner();
    if lo > hi {
        return Vec::new();
    }

    let mut out = Vec::with_capacity((hi - lo + 1) as usize);
    let mut pending = VecDeque::from([(lo, hi)]);
    while let Some((lo, hi)) = pending.pop_front() {
        let mid = lo + (hi - lo) / 2;
        out.push(mid);
        if lo < mid {
            pending.push_back((lo, mid - 1));
        }
        if mid < hi {
            pending.push_back((mid + 1, hi));
        }
    }
    debug_assert_eq!(out.len() as i64, hi - lo + 1);
    out
}

/// The first `levels` levels of the balanced order over `range`.
pub fn seed_levels(range: RangeInclusive<i64>, levels: u32) -> Vec<i64> {
    let mut order = balanced_order(range);
    order.truncate((1_usize << levels) - 1);
    order
}

/// Split `range` into `parts` contiguous sub-ranges; the last absorbs
/// the remainder.
pub fn partition(range: RangeInclusive<i64>, parts: usize) -> Vec<RangeInclusive<i64>> {
    debug_assert!(parts > 0, "Need at least one part");
    let (lo, hi) = range.into_inner();
    let total = hi - lo + 1;
    let chunk = total / parts as i64;

    (0..parts as i64)
        .map(|i| {
            let start = lo + i * chunk;
            let end = if i == parts as i64 - 1 {
                hi
            } else {
                start + chunk - 1
            };
            start..=end
        })
        .collect()
}

/// Keys a single worker inserts, in order.
pub fn worker_keys(pattern: InsertPattern, range: RangeInclusive<i64>, seed: u64) -> Vec<i64> {
    match pattern {
        InsertPattern::Balanced => balanced_order(range),
        InsertPattern::Sequential => range.collect(),
        InsertPattern::Random => {
            let count = range.end() - range.start() + 1;
            let mut rng = StdRng::seed_from_u64(seed);
            (0..count).map(|_| rng.gen_range(range.clone())).collect()
        }
    }
}
