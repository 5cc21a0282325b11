//! Sample source abstraction for the physics producer.
//!
//! A source hands out `(time, raw_detuning)` samples forever. The bundled
//! implementation replays one pre-loaded trace in a loop; the producer
//! detects the restart from the timestamp going backwards.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::dataset::Trace;

/// One microphonics sample as read from the dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Dataset timestamp (seconds). Restarts on every pass.
    pub time: f64,
    /// Normalised detuning, roughly in [-1, 1] before the offset.
    pub raw_detuning: f64,
}

/// Trait abstracting where detuning samples come from.
///
/// The producer calls [`next_sample`](SampleSource::next_sample) in a
/// select! with cancellation.
#[async_trait]
pub trait SampleSource: Send + 'static {
    /// Next sample. Sources never run dry; `Err` is unrecoverable.
    async fn next_sample(&mut self) -> Result<Sample>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;

    /// Duration of one full pass, when the source knows it.
    fn pass_duration(&self) -> Option<f64> {
        None
    }
}

// ============================================================================
// Looping Source
// ============================================================================

/// Replays a trace forever with an optional inter-sample delay.
///
/// With no delay the source yields to the scheduler between samples so the
/// producer loop never starves the other tasks.
pub struct LoopingSource {
    trace: Trace,
    position: usize,
    delay: Duration,
    passes: u64,
}

impl LoopingSource {
    pub fn new(trace: Trace, delay_ms: u64) -> Self {
        Self {
            trace,
            position: 0,
            delay: Duration::from_millis(delay_ms),
            passes: 0,
        }
    }

    /// Completed passes through the trace.
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

#[async_trait]
impl SampleSource for LoopingSource {
    async fn next_sample(&mut self) -> Result<Sample> {
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        let samples = self.trace.samples();
        if samples.is_empty() {
            anyhow::bail!("trace '{}' has no samples", self.trace.name());
        }

        let sample = samples[self.position];
        self.position += 1;
        if self.position == samples.len() {
            self.position = 0;
            self.passes += 1;
        }
        Ok(sample)
    }

    fn source_name(&self) -> &str {
        self.trace.name()
    }

    fn pass_duration(&self) -> Option<f64> {
        Some(self.trace.pass_duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn restarts_at_end_of_trace() {
        let trace = Trace::new(
            "two",
            vec![
                Sample {
                    time: 0.0,
                    raw_detuning: 0.1,
                },
                Sample {
                    time: 1.0,
                    raw_detuning: 0.2,
                },
            ],
        )
        .unwrap();
        let mut source = LoopingSource::new(trace, 0);

        let times: Vec<f64> = {
            let mut out = Vec::new();
            for _ in 0..5 {
                out.push(source.next_sample().await.unwrap().time);
            }
            out
        };
        assert_eq!(times, vec![0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(source.passes(), 2);
        assert_eq!(source.pass_duration(), Some(2.0));
    }
}
