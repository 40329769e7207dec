//! Seeded multi-thread runs of set operations with periodic invariant checks.
//!
//! `run_interleaved` simulates concurrency on one OS thread, so a failing
//! seed replays the exact same interleaving. `run_parallel` uses real
//! threads; only each thread's operation stream is reproducible.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;

use hoh_core::{Counterexample, ThreadAction};
use tracing::{info, warn};

use crate::error::DstError;
use crate::random::DeterministicRng;
use crate::{DstEnv, FaultConfig};

/// Maximum threads a harness will drive.
const THREADS_COUNT_MAX: usize = 64;

/// Actions kept for the counterexample of an interleaved run.
const TRACE_LEN_MAX: usize = 64;

/// Shape of one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Logical (interleaved) or OS (parallel) threads
    pub threads_count: usize,
    pub operations_per_thread: u64,
    /// Chance of switching to a random thread after each operation
    pub yield_probability: f64,
    /// Simulated delays between operations
    pub fault_config: FaultConfig,
    /// Operations between invariant checks; 0 checks only at the end
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 200,
            yield_probability: 0.25,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 16,
        }
    }
}

impl HarnessConfig {
    /// Many threads, long runs, aggressive delays.
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 2_000,
            yield_probability: 0.4,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 128,
        }
    }

    /// Two threads, no delays; for fast unit tests.
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            yield_probability: 0.1,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 10,
        }
    }

    pub fn validate(&self) -> Result<(), DstError> {
        if self.threads_count == 0 || self.threads_count > THREADS_COUNT_MAX {
            return Err(DstError::InvalidConfig(format!(
                "threads_count must be in 1..={}, got {}",
                THREADS_COUNT_MAX, self.threads_count
            )));
        }
        if !(0.0..=1.0).contains(&self.yield_probability) {
            return Err(DstError::InvalidConfig(format!(
                "yield_probability must be in 0..=1, got {}",
                self.yield_probability
            )));
        }
        Ok(())
    }
}

/// Outcome of one harness run.
#[derive(Debug, Clone)]
pub struct HarnessResult {
    pub seed: u64,
    pub operations_count: u64,
    /// Thread switches taken by the interleaved scheduler
    pub context_switches_count: u64,
    pub invariant_checks_count: u64,
    pub all_invariants_held: bool,
    /// Operation error or invariant message that stopped the run
    pub first_violation: Option<String>,
    /// Recent actions leading to the violation (interleaved runs only)
    pub counterexample: Option<Counterexample>,
}

/// Drives set operations from several threads under one seed.
pub struct DstHarness {
    env: DstEnv,
    config: HarnessConfig,
    operations_count: AtomicU64,
    context_switches_count: AtomicU64,
    invariant_checks_count: AtomicU64,
    violation: Mutex<Option<String>>,
    stopped: AtomicBool,
}

impl DstHarness {
    pub fn new(seed: u64, config: HarnessConfig) -> Result<Self, DstError> {
        config.validate()?;
        let env = DstEnv::with_fault_config(seed, config.fault_config);

        Ok(Self {
            env,
            config,
            operations_count: AtomicU64::new(0),
            context_switches_count: AtomicU64::new(0),
            invariant_checks_count: AtomicU64::new(0),
            violation: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn env(&mut self) -> &mut DstEnv {
        &mut self.env
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the harness with a violation message. The first violation wins.
    pub fn stop_with_violation(&self, message: String) {
        let mut guard = self.violation.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            warn!(seed = self.env.seed(), %message, "invariant violated");
            *guard = Some(message);
        }
        self.stopped.store(true, Ordering::Release);
    }

    fn should_check_invariants(&self, count: u64) -> bool {
        self.config.invariant_check_interval != 0
            && count % self.config.invariant_check_interval == 0
    }

    /// Run logical threads interleaved on the calling thread.
    ///
    /// `generate_op` receives the thread index and its step and returns an
    /// operation; `execute` applies it. A thread keeps running until the
    /// seeded scheduler decides to yield.
    pub fn run_interleaved<F, T, R, I>(
        &mut self,
        mut generate_op: F,
        mut execute: R,
        mut check_invariants: I,
    ) -> HarnessResult
    where
        T: std::fmt::Debug,
        F: FnMut(&mut DstEnv, usize, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, usize, T) -> Result<bool, String>,
        I: FnMut() -> Result<(), String>,
    {
        let threads_count = self.config.threads_count;
        let ops_per_thread = self.config.operations_per_thread;
        let mut thread_steps = vec![0u64; threads_count];
        let mut trace: Vec<ThreadAction> = Vec::new();
        let mut step = 0u64;
        let mut current = 0usize;

        while !self.is_stopped() {
            if thread_steps[current] >= ops_per_thread {
                let Some(next) = (0..threads_count).find(|&t| thread_steps[t] < ops_per_thread) else {
                    break;
                };
                current = next;
                self.context_switches_count.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if let Some(op) = generate_op(&mut self.env, current, thread_steps[current]) {
                let label = format!("{:?}", op);
                step += 1;
                match execute(&mut self.env, current, op) {
                    Ok(returned) => {
                        trace.push(ThreadAction {
                            thread: current,
                            step,
                            op: label,
                            returned,
                        });
                        if trace.len() > TRACE_LEN_MAX {
                            trace.remove(0);
                        }
                    }
                    Err(e) => {
                        self.stop_with_violation(format!("Thread {}: {}", current, e));
                        break;
                    }
                }
                let count = self.operations_count.fetch_add(1, Ordering::Relaxed) + 1;

                if self.should_check_invariants(count) {
                    self.invariant_checks_count.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = check_invariants() {
                        self.stop_with_violation(e);
                        break;
                    }
                }
            }
            thread_steps[current] += 1;

            self.env.maybe_delay();

            // Yield point
            if threads_count > 1 && self.env.rng().gen_bool(self.config.yield_probability) {
                current = self.env.rng().gen_range(0..threads_count);
                self.context_switches_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        if !self.is_stopped() {
            self.invariant_checks_count.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = check_invariants() {
                self.stop_with_violation(e);
            }
        }

        let mut result = self.build_result();
        if let Some(ref violation) = result.first_violation {
            let mut ce = Counterexample::with_seed(self.env.seed().max(1))
                .with_description(violation.clone());
            for action in trace {
                ce.add_action(action);
            }
            result.counterexample = Some(ce);
        }
        result
    }

    /// Run operations on real OS threads.
    ///
    /// Each thread draws operations from its own generator forked off the
    /// harness seed. Invariants are checked once every thread has joined.
    pub fn run_parallel<R, I>(&mut self, execute: R, check_invariants: I) -> HarnessResult
    where
        R: Fn(usize, &mut DeterministicRng) -> Result<bool, String> + Sync,
        I: FnOnce() -> Result<(), String>,
    {
        let ops_per_thread = self.config.operations_per_thread;
        let mut rngs: Vec<DeterministicRng> = (0..self.config.threads_count)
            .map(|_| self.env.rng().fork())
            .collect();

        let this = &*self;
        let execute = &execute;
        thread::scope(|s| {
            for (thread_id, rng) in rngs.iter_mut().enumerate() {
                s.spawn(move || {
                    for _ in 0..ops_per_thread {
                        if this.is_stopped() {
                            break;
                        }
                        if let Err(e) = execute(thread_id, rng) {
                            this.stop_with_violation(format!("Thread {}: {}", thread_id, e));
                            break;
                        }
                        this.operations_count.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        if !self.is_stopped() {
            self.invariant_checks_count.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = check_invariants() {
                self.stop_with_violation(e);
            }
        }

        self.build_result()
    }

    fn build_result(&self) -> HarnessResult {
        let violation = self
            .violation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let result = HarnessResult {
            seed: self.env.seed(),
            operations_count: self.operations_count.load(Ordering::Relaxed),
            context_switches_count: self.context_switches_count.load(Ordering::Relaxed),
            invariant_checks_count: self.invariant_checks_count.load(Ordering::Relaxed),
            all_invariants_held: violation.is_none(),
            first_violation: violation,
            counterexample: None,
        };
        info!(
            seed = result.seed,
            ops = result.operations_count,
            passed = result.all_invariants_held,
            "harness run finished"
        );
        result
    }
}

impl HarnessResult {
    /// One status line, then the violation and its trace if any.
    pub fn format(&self) -> String {
        let status = if self.all_invariants_held { "PASS" } else { "FAIL" };

        let mut result = format!(
            "[{}] DST_SEED={} ops={} switches={} checks={}",
            status,
            self.seed,
            self.operations_count,
            self.context_switches_count,
            self.invariant_checks_count
        );

        if let Some(ref violation) = self.first_violation {
            result.push_str(&format!("\n  Violation: {}", violation));
        }
        if let Some(ref ce) = self.counterexample {
            result.push('\n');
            result.push_str(&ce.render_diagram());
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_rejects_zero_threads() {
        let config = HarnessConfig {
            threads_count: 0,
            ..HarnessConfig::quick()
        };
        assert!(DstHarness::new(1, config).is_err());
    }

    #[test]
    fn test_interleaved_runs_every_operation() {
        let config = HarnessConfig {
            threads_count: 3,
            operations_per_thread: 20,
            yield_probability: 0.5,
            invariant_check_interval: 5,
            ..HarnessConfig::quick()
        };
        let mut harness = DstHarness::new(12345, config).unwrap();
        let mut per_thread = vec![0u64; 3];

        let result = harness.run_interleaved(
            |_env, _thread, step| Some(step),
            |_env, thread, _op| {
                per_thread[thread] += 1;
                Ok(true)
            },
            || Ok(()),
        );

        assert!(result.all_invariants_held, "{}", result.format());
        assert_eq!(per_thread, vec![20, 20, 20]);
        assert_eq!(result.operations_count, 60);
        assert!(result.context_switches_count > 0);
    }

    #[test]
    fn test_interleaved_stops_on_violation() {
        let mut harness = DstHarness::new(12345, HarnessConfig::quick()).unwrap();

        let result = harness.run_interleaved(
            |_env, thread, step| Some((thread, step)),
            |_env, _thread, (_, step)| {
                if step == 5 {
                    Err("Intentional failure at step 5".to_string())
                } else {
                    Ok(true)
                }
            },
            || Ok(()),
        );

        assert!(!result.all_invariants_held);
        assert!(result.first_violation.is_some());
        let ce = result.counterexample.as_ref().unwrap();
        assert!(!ce.interleaving.is_empty());
        assert!(result.operations_count < 100);
    }

    #[test]
    fn test_same_seed_same_interleaving() {
        let run = |seed| {
            let mut harness = DstHarness::new(seed, HarnessConfig::quick()).unwrap();
            let mut order = Vec::new();
            harness.run_interleaved(
                |_env, thread, _step| Some(thread),
                |_env, thread, _op| {
                    order.push(thread);
                    Ok(true)
                },
                || Ok(()),
            );
            order
        };

        assert_eq!(run(77), run(77));
    }

    #[test]
    fn test_parallel_runs_every_operation() {
        let config = HarnessConfig {
            threads_count: 4,
            operations_per_thread: 250,
            ..HarnessConfig::quick()
        };
        let mut harness = DstHarness::new(9, config).unwrap();
        let executed = AtomicUsize::new(0);

        let result = harness.run_parallel(
            |_thread, rng| {
                let _ = rng.gen_range(0..10_u8);
                executed.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            },
            || Ok(()),
        );

        assert!(result.all_invariants_held, "{}", result.format());
        assert_eq!(executed.load(Ordering::Relaxed), 1000);
        assert_eq!(result.operations_count, 1000);
    }
}
