//! # hoh-dst
//!
//! Deterministic Simulation Testing framework for lock-coupled concurrent
//! structures.
//!
//! Inspired by FoundationDB and TigerBeetle, this crate provides deterministic
//! simulation of time, randomness, and faults. All behavior is reproducible
//! via a seed.
//!
//! ## Harnesses
//!
//! - `fault_injection`: boundary fault injection over any `DstTestableSet`,
//!   checked against a `BTreeSet` model
//! - `harness`: simulated interleavings of logical threads, and real
//!   parallel runs driven by per-thread seeded RNGs
//!
//! ## Usage
//!
//! ```rust
//! use hoh_dst::DstEnv;
//!
//! let seed = 12345;
//! let mut env = DstEnv::new(seed);
//!
//! // Deterministic time
//! env.advance_us(1_000);
//! assert_eq!(env.now_us(), 1_000);
//!
//! // Deterministic randomness
//! let value: u64 = env.rng().gen();
//! let choice = env.rng().gen_range(0..10);
//! # let _ = (value, choice);
//!
//! // Deterministic fault injection
//! if env.fault().should_fail() {
//!     // Simulate failure
//! }
//! ```
//!
//! ## Reproducibility
//!
//! To reproduce a failing test:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

pub mod env;
pub mod error;
pub mod fault;
pub mod fault_injection;
pub mod harness;
pub mod random;

pub use env::DstEnv;
pub use error::DstError;
pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use fault_injection::{run_dst_scenario, DstOp, DstResult, DstRunner, DstStats, DstTestableSet, FaultPoint, FaultType};
pub use harness::{DstHarness, HarnessConfig, HarnessResult};
pub use random::DeterministicRng;

/// Environment variable holding the seed to replay.
pub const SEED_ENV: &str = "DST_SEED";

/// Environment variable holding the iteration count.
pub const ITERATIONS_ENV: &str = "DST_ITERATIONS";

/// Get DST seed from environment or generate random one.
///
/// Prints the seed for reproduction. Use `DST_SEED=<seed>` to reproduce.
pub fn get_or_generate_seed() -> Result<u64, DstError> {
    match std::env::var(SEED_ENV) {
        Ok(s) => {
            let seed = parse_seed(&s)?;
            println!("DST_SEED={} (from environment)", seed);
            Ok(seed)
        }
        Err(_) => {
            let seed = rand::random::<u64>().max(1);
            println!("DST_SEED={} (randomly generated)", seed);
            Ok(seed)
        }
    }
}

/// Get the iteration count from `DST_ITERATIONS`, or `default` when unset.
pub fn iterations_from_env(default: u64) -> Result<u64, DstError> {
    match std::env::var(ITERATIONS_ENV) {
        Ok(s) => parse_env(ITERATIONS_ENV, &s),
        Err(_) => Ok(default),
    }
}

/// Zero is reserved: counterexamples treat it as "no seed".
fn parse_seed(value: &str) -> Result<u64, DstError> {
    match parse_env(SEED_ENV, value)? {
        0 => Err(DstError::InvalidEnv {
            var: SEED_ENV,
            value: value.to_string(),
            expected: "a nonzero u64",
        }),
        seed => Ok(seed),
    }
}

fn parse_env(var: &'static str, value: &str) -> Result<u64, DstError> {
    value.trim().parse().map_err(|_| DstError::InvalidEnv {
        var,
        value: value.to_string(),
        expected: "a valid u64",
    })
}
