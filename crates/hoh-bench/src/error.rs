//! Driver errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker {worker} panicked during round {round}")]
    WorkerPanicked { worker: String, round: u64 },

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}
