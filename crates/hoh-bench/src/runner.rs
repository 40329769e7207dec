//! One timed round: bulk inserts, with optional lookup/removal load.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use hoh_tree::{LockCoupledTree, LockKind, TreeConfig};

use crate::config::{BenchConfig, InsertPattern};
use crate::error::BenchError;
use crate::workload::{partition, seed_levels, worker_keys, SEED_LEVELS};

/// Outcome of one round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round: u64,
    pub lock: LockKind,
    pub pattern: InsertPattern,
    pub workers: usize,
    pub keys_count: i64,
    pub insert_ms: f64,
    pub lookups: u64,
    pub hits: u64,
    pub removals: u64,
    pub removed: u64,
    pub final_len: usize,
    pub height: usize,
}

impl RoundReport {
    pub fn format(&self) -> String {
        let mut line = format!(
            "round {}: {} {:?} x{} inserted {} keys in {:.2}ms (len {}, height {})",
            self.round,
            self.lock,
            self.pattern,
            self.workers,
            self.keys_count,
            self.insert_ms,
            self.final_len,
            self.height
        );
        if self.lookups > 0 || self.removals > 0 {
            line.push_str(&format!(
                ", load: {}/{} lookups hit, {}/{} removals",
                self.hits, self.lookups, self.removed, self.removals
            ));
        }
        line
    }
}

#[derive(Default)]
struct LoadCounters {
    lookups: AtomicU64,
    hits: AtomicU64,
    removals: AtomicU64,
    removed: AtomicU64,
}

/// Run a single round on a fresh tree.
pub fn run_round(config: &BenchConfig, round: u64, seed: u64) -> Result<RoundReport, BenchError> {
    config.validate()?;

    let tree = LockCoupledTree::from_config(&TreeConfig::with_lock(config.lock));
    let full = 1..=config.key_count();

    for key in seed_levels(full.clone(), SEED_LEVELS) {
        tree.insert(key);
    }
    debug!(round, seeded = tree.len(), "Seeded top levels");

    let ranges = partition(full, config.workers);
    let stop = AtomicBool::new(false);
    let counters = LoadCounters::default();
    let pause = Duration::from_micros(config.load_pause_us);
    // Load threads work on the lower half, where inserts are still landing.
    let load_max = (config.key_count() / 2).max(1);

    let insert_ms = thread::scope(|s| -> Result<f64, BenchError> {
        let load_handles = if config.load {
            let tree = &tree;
            let stop = &stop;
            let counters = &counters;
            let reader = s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed ^ 0x5EED_0001);
                while !stop.load(Ordering::Acquire) {
                    if tree.contains(rng.gen_range(1..=load_max)) {
                        counters.hits.fetch_add(1, Ordering::Relaxed);
                    }
                    counters.lookups.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(pause);
                }
            });
            let remover = s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed ^ 0x5EED_0002);
                while !stop.load(Ordering::Acquire) {
                    if tree.remove(rng.gen_range(1..=load_max)) {
                        counters.removed.fetch_add(1, Ordering::Relaxed);
                    }
                    counters.removals.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(pause);
                }
            });
            vec![("reader", reader), ("remover", remover)]
        } else {
            Vec::new()
        };

        let start = Instant::now();
        let inserters: Vec<_> = ranges
            .iter()
            .enumerate()
            .map(|(w, range)| {
                let keys = worker_keys(config.pattern, range.clone(), seed.wrapping_add(w as u64));
                let tree = &tree;
                s.spawn(move || {
                    for key in keys {
                        tree.insert(key);
                    }
                })
            })
            .collect();

        let mut outcome = Ok(());
        for (w, handle) in inserters.into_iter().enumerate() {
            if handle.join().is_err() && outcome.is_ok() {
                outcome = Err(BenchError::WorkerPanicked {
                    worker: format!("inserter-{w}"),
                    round,
                });
            }
        }
        let elapsed = start.elapsed();

        stop.store(true, Ordering::Release);
        for (name, handle) in load_handles {
            if handle.join().is_err() && outcome.is_ok() {
                outcome = Err(BenchError::WorkerPanicked {
                    worker: name.to_string(),
                    round,
                });
            }
        }

        outcome.map(|()| elapsed.as_secs_f64() * 1_000.0)
    })?;

    let audit = tree.audit();
    debug_assert!(audit.is_valid(), "{:?}", audit.violations);

    let report = RoundReport {
        round,
        lock: config.lock,
        pattern: config.pattern,
        workers: config.workers,
        keys_count: config.key_count(),
        insert_ms,
        lookups: counters.lookups.into_inner(),
        hits: counters.hits.into_inner(),
        removals: counters.removals.into_inner(),
        removed: counters.removed.into_inner(),
        final_len: tree.len(),
        height: audit.height,
    };
    info!(
        round,
        lock = %report.lock,
        insert_ms = report.insert_ms,
        final_len = report.final_len,
        height = report.height,
        "Round complete"
    );
    Ok(report)
}
