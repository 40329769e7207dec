//! Probabilistic fault injection.

use crate::random::DeterministicRng;

/// Maximum fault probability accepted by the injector.
const FAULT_PROBABILITY_MAX: f64 = 0.5;

/// How often faults fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    /// Probability that a single fault check fires
    pub probability: f64,
    /// Probability that `DstEnv::maybe_delay` simulates a slow thread
    pub delay_probability: f64,
    /// Upper bound of a simulated delay in microseconds
    pub delay_us_max: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            probability: 0.05,
            delay_probability: 0.1,
            delay_us_max: 1_000,
        }
    }
}

impl FaultConfig {
    /// No faults, no delays.
    pub fn none() -> Self {
        Self {
            probability: 0.0,
            delay_probability: 0.0,
            delay_us_max: 0,
        }
    }

    /// Frequent faults for stress runs.
    pub fn aggressive() -> Self {
        Self {
            probability: 0.25,
            delay_probability: 0.3,
            delay_us_max: 10_000,
        }
    }
}

/// Counters kept by the injector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub checks_count: u64,
    pub faults_count: u64,
}

/// Decides, deterministically, when a fault fires.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!(
            (0.0..=FAULT_PROBABILITY_MAX).contains(&config.probability),
            "Fault probability out of range: {}",
            config.probability
        );
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Roll for a fault.
    pub fn should_fail(&mut self) -> bool {
        self.stats.checks_count += 1;
        if self.config.probability <= 0.0 {
            return false;
        }
        let fired = self.rng.gen_bool(self.config.probability);
        if fired {
            self.stats.faults_count += 1;
        }
        fired
    }

    /// Roll for a simulated delay; returns its length in microseconds.
    pub fn delay_us(&mut self) -> Option<u64> {
        if self.config.delay_probability <= 0.0 || self.config.delay_us_max == 0 {
            return None;
        }
        if self.rng.gen_bool(self.config.delay_probability) {
            Some(self.rng.gen_range(1..=self.config.delay_us_max))
        } else {
            None
        }
    }

    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_fails() {
        let mut injector = FaultInjector::new(DeterministicRng::new(1), FaultConfig::none());
        for _ in 0..1000 {
            assert!(!injector.should_fail());
            assert!(injector.delay_us().is_none());
        }
        assert_eq!(injector.stats().checks_count, 1000);
        assert_eq!(injector.stats().faults_count, 0);
    }

    #[test]
    fn test_aggressive_fails_sometimes() {
        let mut injector = FaultInjector::new(DeterministicRng::new(1), FaultConfig::aggressive());
        let fired = (0..1000).filter(|_| injector.should_fail()).count();
        assert!(fired > 0 && fired < 1000, "fired={}", fired);
        assert_eq!(injector.stats().faults_count, fired as u64);
    }
}
