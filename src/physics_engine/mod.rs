//! Physics Engine Module
//!
//! Deterministic cavity calculations for the FE-FRT simulator.
//!
//! - `cavity` - loaded Q, detuning scaling, forward power
//! - `averaging` - reset-on-change running average of the powers
//! - `timeline` - monotonic time axis across dataset wraparound

pub mod averaging;
pub mod cavity;
pub mod timeline;

pub use averaging::{AveragingState, Signature};
pub use cavity::{
    drive, feedback_limited_detuning, forward_power, loaded_q, parallel_q, scale_detuning, Drive,
    LoadedQ,
};
pub use timeline::{measured_pass_duration, TimeUnwrapper};

use crate::cache::DerivedValues;
use crate::config::CavityConfig;
use crate::types::ControlVariable;

/// Instantaneous outputs of both feedback paths for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathOutputs {
    pub detuning: f64,
    pub detuning_secondary: f64,
    pub power: f64,
    pub power_secondary: f64,
}

/// Evaluate one raw detuning sample against a derived-value snapshot.
///
/// The primary path sees the full detuning with the plain loaded Q; the
/// secondary path sees only the residual the tuner cannot absorb, with the
/// feedback-limited loaded Q.
pub fn evaluate_sample(
    cavity: &CavityConfig,
    derived: &DerivedValues,
    raw_detuning: f64,
    detuning_offset: f64,
) -> PathOutputs {
    let inputs = &derived.inputs;
    let qe = inputs.get(ControlVariable::Qe);

    let detuning = scale_detuning(
        raw_detuning,
        inputs.get(ControlVariable::UphonicsRange),
        detuning_offset,
    );
    let detuning_secondary =
        feedback_limited_detuning(detuning, inputs.get(ControlVariable::TuningRange));

    PathOutputs {
        detuning,
        detuning_secondary,
        power: forward_power(cavity, qe, derived.loaded_q.ql, detuning),
        power_secondary: forward_power(cavity, qe, derived.loaded_q.ql_frt, detuning_secondary),
    }
}
