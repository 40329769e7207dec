//! Simulation environment: seed, clock, randomness and faults.

use std::fmt;

use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;

/// Everything nondeterministic about a simulated run, derived from one seed.
#[derive(Debug, Clone)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    fault: FaultInjector,
    now_us: u64,
    delays_count: u64,
}

impl DstEnv {
    /// Environment with the default fault configuration.
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    pub fn with_fault_config(seed: u64, config: FaultConfig) -> Self {
        debug_assert!(seed != 0, "Seed should not be zero");
        Self {
            seed,
            rng: DeterministicRng::new(seed),
            // Separate stream so adding a fault check never shifts workload choices.
            fault: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), config),
            now_us: 0,
            delays_count: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    /// Simulated time in microseconds.
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    pub fn advance_us(&mut self, us: u64) {
        self.now_us = self.now_us.saturating_add(us);
    }

    /// Maybe simulate a slow thread by advancing the clock.
    pub fn maybe_delay(&mut self) {
        if let Some(us) = self.fault.delay_us() {
            self.delays_count += 1;
            self.advance_us(us);
        }
    }

    /// `DST_SEED=<seed>`, for assertion messages.
    pub fn format_seed(&self) -> String {
        format!("DST_SEED={}", self.seed)
    }

    pub fn stats(&self) -> EnvStats {
        let fault = self.fault.stats();
        EnvStats {
            seed: self.seed,
            now_us: self.now_us,
            delays_count: self.delays_count,
            fault_checks_count: fault.checks_count,
            faults_count: fault.faults_count,
        }
    }
}

/// Summary of an environment after a run.
#[derive(Debug, Clone, Copy)]
pub struct EnvStats {
    pub seed: u64,
    pub now_us: u64,
    pub delays_count: u64,
    pub fault_checks_count: u64,
    pub faults_count: u64,
}

impl fmt::Display for EnvStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DST_SEED={} sim_time={}us delays={} faults={}/{}",
            self.seed, self.now_us, self.delays_count, self.faults_count, self.fault_checks_count
        )
    }
}
