//! Reset-on-change running average of the forward powers.
//!
//! The average is conditioned on the control values that shape the power
//! curve. Whenever any of them moves, the accumulators restart from the
//! current sample so the plotted average always describes one setting.

use crate::controls::ControlState;
use crate::types::ControlVariable;

/// Control values the running average is conditioned on.
///
/// The FRT on/off flag is deliberately not part of it: both paths are
/// averaged continuously and toggling the tuner only changes which one is
/// highlighted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signature {
    pub fom: f64,
    pub qe: f64,
    pub tuning_range: f64,
    pub uphonics_range: f64,
}

impl Signature {
    pub fn from_controls(controls: &ControlState) -> Self {
        Self {
            fom: controls.get(ControlVariable::FoM),
            qe: controls.get(ControlVariable::Qe),
            tuning_range: controls.get(ControlVariable::TuningRange),
            uphonics_range: controls.get(ControlVariable::UphonicsRange),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AveragingState {
    signature: Option<Signature>,
    sum_primary: f64,
    sum_secondary: f64,
    count: u64,
}

impl AveragingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one sample and return `(avg_primary, avg_secondary)`.
    pub fn update(&mut self, signature: Signature, primary: f64, secondary: f64) -> (f64, f64) {
        if self.signature != Some(signature) {
            self.signature = Some(signature);
            self.sum_primary = 0.0;
            self.sum_secondary = 0.0;
            self.count = 0;
        }

        self.sum_primary += primary;
        self.sum_secondary += secondary;
        self.count += 1;

        let n = self.count as f64;
        (self.sum_primary / n, self.sum_secondary / n)
    }

    /// Samples accumulated under the current signature.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn signature(&self) -> Option<Signature> {
        self.signature
    }
}
