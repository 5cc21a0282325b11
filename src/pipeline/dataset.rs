//! Microphonics traces: CSV loading and synthetic generation.
//!
//! A CSV trace needs a header row naming a `time` and a `detuning` column
//! (any order, extra columns ignored). Rows that fail to parse, or whose
//! timestamp does not increase, are logged and skipped.

use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::source::Sample;
use crate::config::defaults::{
    DETUNING_OFFSET, SINGLE_SAMPLE_PASS_SECS, SYNTHETIC_SAMPLE_SPACING_SECS,
};
use crate::physics_engine::measured_pass_duration;

pub const TIME_COLUMN: &str = "time";
pub const DETUNING_COLUMN: &str = "detuning";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset {0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    #[error("Dataset {0} has no '{1}' column")]
    MissingColumn(PathBuf, &'static str),

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Dataset '{0}' contains no usable samples")]
    Empty(String),

    #[error("Sample {index} at t={time} does not follow t={previous}")]
    Unordered { index: usize, time: f64, previous: f64 },

    #[error("Wrap offset {offset}s does not exceed the trace span of {span}s")]
    WrapOffsetTooShort { offset: f64, span: f64 },
}

/// A finite, non-empty, time-ordered microphonics trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    name: String,
    samples: Vec<Sample>,
    pass_duration: f64,
}

impl Trace {
    /// Wrap samples, measuring the pass duration from their timestamps.
    ///
    /// Timestamps must be strictly increasing. A one-sample trace gets
    /// [`SINGLE_SAMPLE_PASS_SECS`] so replays still move forward in time.
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Result<Self, DatasetError> {
        let name = name.into();
        if samples.is_empty() {
            return Err(DatasetError::Empty(name));
        }
        if let Some((index, pair)) = samples
            .windows(2)
            .enumerate()
            .find(|(_, pair)| pair[1].time <= pair[0].time)
        {
            return Err(DatasetError::Unordered {
                index: index + 1,
                time: pair[1].time,
                previous: pair[0].time,
            });
        }

        let pass_duration = if samples.len() == 1 {
            SINGLE_SAMPLE_PASS_SECS
        } else {
            let times: Vec<f64> = samples.iter().map(|s| s.time).collect();
            measured_pass_duration(&times)
        };
        Ok(Self {
            name,
            samples,
            pass_duration,
        })
    }

    /// Replace the measured pass duration.
    ///
    /// The override must exceed the span of one pass, otherwise replayed
    /// time would land on or before the previous pass.
    /// On error the measured duration is kept.
    pub fn set_pass_duration(&mut self, secs: f64) -> Result<(), DatasetError> {
        let span = self.span();
        if !secs.is_finite() || secs <= span {
            return Err(DatasetError::WrapOffsetTooShort { offset: secs, span });
        }
        self.pass_duration = secs;
        Ok(())
    }

    /// Last minus first timestamp.
    pub fn span(&self) -> f64 {
        match self.samples.as_slice() {
            [first, .., last] => last.time - first.time,
            _ => 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn pass_duration(&self) -> f64 {
        self.pass_duration
    }
}

// ============================================================================
// CSV
// ============================================================================

/// Load a trace from a CSV file with `time` and `detuning` columns.
pub fn load_csv(path: &Path) -> Result<Trace, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::Io(path.to_path_buf(), e))?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line.map_err(|e| DatasetError::Io(path.to_path_buf(), e))?,
        None => return Err(DatasetError::Empty(path.display().to_string())),
    };
    let column = |wanted: &'static str| {
        header
            .split(',')
            .position(|h| h.trim().trim_matches('"').eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DatasetError::MissingColumn(path.to_path_buf(), wanted))
    };
    let time_idx = column(TIME_COLUMN)?;
    let detuning_idx = column(DETUNING_COLUMN)?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for (idx, line_result) in lines.enumerate() {
        let line_num = idx + 2;
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "Error reading dataset line");
                skipped += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(&line, line_num, time_idx, detuning_idx) {
            Ok(sample) => {
                let previous = samples.last().map(|s: &Sample| s.time);
                match previous {
                    Some(previous) if sample.time <= previous => {
                        tracing::warn!(
                            line = line_num,
                            time = sample.time,
                            previous,
                            "Skipping out-of-order dataset row"
                        );
                        skipped += 1;
                    }
                    _ => samples.push(sample),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping dataset row");
                skipped += 1;
            }
        }
    }

    let trace = Trace::new(path.display().to_string(), samples)?;
    tracing::info!(
        count = trace.len(),
        skipped,
        pass_duration = trace.pass_duration(),
        path = %path.display(),
        "Loaded detuning trace"
    );
    Ok(trace)
}

fn parse_row(
    line: &str,
    line_num: usize,
    time_idx: usize,
    detuning_idx: usize,
) -> Result<Sample, DatasetError> {
    let fields: Vec<&str> = line.split(',').collect();
    let field = |idx: usize, name: &str| -> Result<f64, DatasetError> {
        let raw = fields.get(idx).ok_or_else(|| DatasetError::Parse {
            line: line_num,
            message: format!("missing {name} field"),
        })?;
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DatasetError::Parse {
                line: line_num,
                message: format!("invalid {name} value '{}'", raw.trim()),
            })
    };
    Ok(Sample {
        time: field(time_idx, TIME_COLUMN)?,
        raw_detuning: field(detuning_idx, DETUNING_COLUMN)?,
    })
}

/// Write samples as a `time,detuning` CSV.
pub fn write_csv<W: Write>(samples: &[Sample], mut out: W) -> io::Result<()> {
    writeln!(out, "{TIME_COLUMN},{DETUNING_COLUMN}")?;
    for s in samples {
        writeln!(out, "{},{}", s.time, s.raw_detuning)?;
    }
    out.flush()
}

// ============================================================================
// Synthetic trace
// ============================================================================

/// Mechanical modes as (harmonic of the loop frequency, amplitude).
///
/// Integer harmonics make the trace continuous across the loop boundary.
const MODES: [(f64, f64); 4] = [(1.0, 0.45), (3.0, 0.25), (5.0, 0.15), (11.0, 0.08)];

/// Standard deviation of the broadband noise added to the modes.
const NOISE_SIGMA: f64 = 0.04;

/// Deterministic synthetic microphonics trace of `count` samples.
///
/// The signal is a sum of sinusoidal mechanical modes with seeded random
/// phases plus Gaussian noise, clamped to [-1, 1] and shifted by the
/// detuning offset so that the producer's scaling recovers it exactly.
pub fn synthetic(count: usize, seed: u64) -> Result<Trace, DatasetError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, NOISE_SIGMA).map_err(|e| DatasetError::Parse {
        line: 0,
        message: e.to_string(),
    })?;

    let loop_secs = count as f64 * SYNTHETIC_SAMPLE_SPACING_SECS;
    let phases: Vec<f64> = MODES
        .iter()
        .map(|_| rng.gen_range(0.0..std::f64::consts::TAU))
        .collect();

    let samples = (0..count)
        .map(|i| {
            let time = i as f64 * SYNTHETIC_SAMPLE_SPACING_SECS;
            let modes: f64 = MODES
                .iter()
                .zip(&phases)
                .map(|(&(harmonic, amplitude), phase)| {
                    amplitude * (std::f64::consts::TAU * harmonic * time / loop_secs + phase).sin()
                })
                .sum();
            let signal = (modes + noise.sample(&mut rng)).clamp(-1.0, 1.0);
            Sample {
                time,
                raw_detuning: signal - DETUNING_OFFSET,
            }
        })
        .collect();

    Trace::new(format!("synthetic(seed={seed})"), samples)
}
