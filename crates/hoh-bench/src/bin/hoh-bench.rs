//! hoh-bench: time bulk inserts into a lock-coupled tree.
//!
//! # Usage
//!
//! ```bash
//! hoh-bench --lock mutex --pattern random --workers 8 --range-exponent 18 --load --rounds 5
//! ```
//!
//! Prints one line per round (or one JSON object with `--json`) followed
//! by a min/avg/max summary of insert time. `RUST_LOG` controls tracing.

use std::process;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hoh_bench::{run_round, BenchConfig, BenchError, RoundReport};

fn run(config: &BenchConfig) -> Result<Vec<RoundReport>, BenchError> {
    config.validate()?;
    let seed = config.seed.unwrap_or_else(rand::random);
    tracing::info!(seed, lock = %config.lock, "Starting {} round(s)", config.rounds);

    let mut reports = Vec::with_capacity(config.rounds as usize);
    for round in 0..config.rounds {
        let report = run_round(config, round, seed.wrapping_add(round))?;
        if config.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", report.format());
        }
        reports.push(report);
    }
    Ok(reports)
}

fn main() {
    // Logs go to stderr so --json output stays parseable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = BenchConfig::parse();

    let reports = match run(&config) {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let times: Vec<f64> = reports.iter().map(|r| r.insert_ms).collect();
    let min = times.iter().copied().fold(f64::INFINITY, f64::min);
    let max = times.iter().copied().fold(0.0, f64::max);
    let avg = times.iter().sum::<f64>() / times.len().max(1) as f64;
    if !config.json {
        println!(
            "{} rounds: min {:.2}ms, avg {:.2}ms, max {:.2}ms",
            times.len(),
            min,
            avg,
            max
        );
    }
}
