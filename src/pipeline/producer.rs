//! Physics producer: turns raw detuning samples into [`ResultRecord`]s.
//!
//! Per sample it reads the derived set through the cache (recomputing only
//! after an input change), evaluates both feedback paths, updates the
//! running average, stamps unwrapped time and sends the record into the
//! bounded results queue. A full queue suspends the producer; records are
//! never dropped.

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::SampleSource;
use crate::cache::DerivedCache;
use crate::config::CavityConfig;
use crate::physics_engine::{evaluate_sample, AveragingState, Signature, TimeUnwrapper};
use crate::types::ResultRecord;

/// Counters reported when the producer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub records: u64,
    pub wraps: u64,
    pub recomputes: u64,
}

pub struct PhysicsProducer<S: SampleSource> {
    source: S,
    cache: DerivedCache,
    cavity: CavityConfig,
    averaging: AveragingState,
    timeline: TimeUnwrapper,
    detuning_offset: f64,
    results: mpsc::Sender<ResultRecord>,
    records: u64,
}

impl<S: SampleSource> PhysicsProducer<S> {
    /// `wrap_offset` overrides the source's own pass duration.
    pub fn new(
        source: S,
        cache: DerivedCache,
        cavity: CavityConfig,
        detuning_offset: f64,
        wrap_offset: Option<f64>,
        results: mpsc::Sender<ResultRecord>,
    ) -> Self {
        let pass_duration = wrap_offset.or(source.pass_duration()).unwrap_or(0.0);
        Self {
            source,
            cache,
            cavity,
            averaging: AveragingState::new(),
            timeline: TimeUnwrapper::new(pass_duration),
            detuning_offset,
            results,
            records: 0,
        }
    }

    pub fn stats(&self) -> ProducerStats {
        ProducerStats {
            records: self.records,
            wraps: self.timeline.wraps(),
            recomputes: self.cache.generation(),
        }
    }

    /// Compute the record for the next sample without sending it.
    pub async fn compute_next(&mut self) -> anyhow::Result<ResultRecord> {
        let sample = self
            .source
            .next_sample()
            .await
            .with_context(|| format!("reading from {}", self.source.source_name()))?;
        let derived = self.cache.snapshot().await?;

        let outputs = evaluate_sample(
            &self.cavity,
            &derived,
            sample.raw_detuning,
            self.detuning_offset,
        );
        let (avg_power, avg_power_secondary) = self.averaging.update(
            Signature::from_controls(&derived.inputs),
            outputs.power,
            outputs.power_secondary,
        );

        let stretched_before = self.timeline.stretched_wraps();
        let time = self.timeline.unwrap(sample.time);
        if stretched_before == 0 && self.timeline.stretched_wraps() == 1 {
            warn!(
                offset = self.timeline.offset(),
                "[Producer] Wrap offset shorter than one pass, stretching to keep time increasing"
            );
        }

        Ok(ResultRecord {
            time,
            detuning: outputs.detuning,
            detuning_secondary: outputs.detuning_secondary,
            power: outputs.power,
            power_secondary: outputs.power_secondary,
            avg_power,
            avg_power_secondary,
        })
    }

    /// Compute one record and send it, waiting while the queue is full.
    ///
    /// Returns false once the consumer has gone away.
    pub async fn step(&mut self) -> anyhow::Result<bool> {
        let record = self.compute_next().await?;
        if self.results.send(record).await.is_err() {
            return Ok(false);
        }
        self.records += 1;
        Ok(true)
    }

    /// Produce until cancelled or until the consumer closes the queue.
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<ProducerStats> {
        info!(
            "[Producer] Streaming samples from {}",
            self.source.source_name()
        );

        loop {
            let keep_going = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[Producer] Shutdown signal received");
                    break;
                }
                result = self.step() => result?,
            };

            if !keep_going {
                warn!("[Producer] Results queue closed, stopping");
                break;
            }
            if self.records % 10_000 == 0 {
                debug!(
                    records = self.records,
                    wraps = self.timeline.wraps(),
                    "[Producer] Progress"
                );
            }
        }

        let stats = self.stats();
        info!(
            records = stats.records,
            wraps = stats.wraps,
            recomputes = stats.recomputes,
            "[Producer] Stopped"
        );
        Ok(stats)
    }
}
