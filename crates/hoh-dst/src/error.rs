//! Errors raised while setting up a simulation run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DstError {
    #[error("{var} must be {expected}, got {value:?}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid harness config: {0}")]
    InvalidConfig(String),
}
