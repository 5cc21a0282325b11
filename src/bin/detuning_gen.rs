//! Synthetic microphonics trace generator
//!
//! Writes a `time,detuning` CSV that `frt-simulator --dataset` can replay.
//!
//! # Usage
//! ```bash
//! ./detuning-gen --samples 1130 --seed 7 > detuning.csv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io;

use frt_simulator::config::defaults::{SYNTHETIC_DEFAULT_SEED, WINDOW_SAMPLES};
use frt_simulator::pipeline::{synthetic, write_csv};

#[derive(Parser, Debug)]
#[command(name = "detuning-gen")]
#[command(about = "Synthetic microphonics detuning trace for the FE-FRT simulator")]
#[command(version)]
struct Args {
    /// Number of samples in the trace
    #[arg(short = 'n', long, default_value_t = WINDOW_SAMPLES)]
    samples: usize,

    /// Random seed for reproducibility
    #[arg(long, default_value_t = SYNTHETIC_DEFAULT_SEED)]
    seed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let trace = synthetic(args.samples, args.seed).context("generating trace")?;
    let stdout = io::stdout();
    write_csv(trace.samples(), stdout.lock()).context("writing CSV to stdout")?;
    Ok(())
}
