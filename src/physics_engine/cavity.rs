//! Closed-form cavity equations: loaded Q, detuning scaling and forward power.
//!
//! All functions are pure. Non-positive or non-finite quality factors are
//! treated as "absent" so a zeroed configuration yields zero outputs instead
//! of NaN or infinity.

use serde::Serialize;

use crate::config::CavityConfig;

/// Combine quality factors in parallel: `1 / Σ(1/Qi)`.
///
/// Terms that are not strictly positive and finite are skipped; with no
/// usable term the result is 0.
pub fn parallel_q(terms: &[f64]) -> f64 {
    let inverse: f64 = terms
        .iter()
        .filter(|q| q.is_finite() && **q > 0.0)
        .map(|q| 1.0 / q)
        .sum();
    if inverse > 0.0 {
        1.0 / inverse
    } else {
        0.0
    }
}

/// Ratio that is 0 when the divisor is not a usable positive number.
fn safe_ratio(numerator: f64, divisor: f64) -> f64 {
    if divisor.is_finite() && divisor > 0.0 {
        numerator / divisor
    } else {
        0.0
    }
}

/// Loaded quality factors derived from the controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadedQ {
    /// Optimal external Q for the given microphonics range
    pub qe_opt: f64,
    /// Equivalent Q of the fast reactive tuner feedback bandwidth
    pub q_frt: f64,
    /// Optimal external Q with the tuner active
    pub qe_opt_frt: f64,
    /// Loaded Q without feedback
    pub ql: f64,
    /// Loaded Q including the tuner feedback bandwidth
    pub ql_frt: f64,
}

/// Compute every loaded-Q quantity from the cavity constants and controls.
///
/// - `Qe_opt = f0 / uphonics_range`
/// - `Q_FRT = FoM · f0 / tuning_range`
/// - `Qe_opt_FRT = 1 / (1/Q0 + 1/Q_FRT)`
/// - `QL = 1 / (1/Qe + 1/Q0)`
/// - `QL_FRT = 1 / (1/Qe + 1/Q0 + 1/Q_FRT)`
pub fn loaded_q(
    cavity: &CavityConfig,
    fom: f64,
    qe: f64,
    uphonics_range: f64,
    tuning_range: f64,
) -> LoadedQ {
    let f0 = cavity.resonant_frequency_hz;
    let q0 = cavity.intrinsic_q;
    let q_frt = safe_ratio(fom * f0, tuning_range);

    LoadedQ {
        qe_opt: safe_ratio(f0, uphonics_range),
        q_frt,
        qe_opt_frt: parallel_q(&[q0, q_frt]),
        ql: parallel_q(&[qe, q0]),
        ql_frt: parallel_q(&[qe, q0, q_frt]),
    }
}

/// Map a raw dataset sample to a detuning in hertz.
///
/// `detuning = uphonics_range · (raw + offset) / 2`
pub fn scale_detuning(raw_detuning: f64, uphonics_range: f64, offset: f64) -> f64 {
    uphonics_range * (raw_detuning + offset) / 2.0
}

/// Residual detuning left once the fast tuner has used its range.
///
/// The tuner compensates up to half its tuning range in either direction, so
/// only the excess `sign(d) · (|d| - tuning_range/2)` remains.
pub fn feedback_limited_detuning(detuning: f64, tuning_range: f64) -> f64 {
    let half_range = tuning_range / 2.0;
    if detuning.abs() > half_range {
        detuning.signum() * (detuning.abs() - half_range)
    } else {
        0.0
    }
}

/// Complex forward drive amplitude.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Drive {
    pub re: f64,
    pub im: f64,
}

impl Drive {
    pub fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }
}

/// Forward drive needed to hold the cavity voltage at the given detuning.
///
/// `drive = Vc · (1 + j·2·QL·Δf/f0) / (√2 · (R/Q) · QL)`
pub fn drive(cavity: &CavityConfig, loaded_q: f64, detuning_hz: f64) -> Drive {
    let denominator = std::f64::consts::SQRT_2 * cavity.r_over_q_ohm * loaded_q;
    let scale = safe_ratio(cavity.cavity_voltage_v, denominator);
    let tan_psi = 2.0 * loaded_q * safe_ratio(detuning_hz, cavity.resonant_frequency_hz);
    Drive {
        re: scale,
        im: scale * tan_psi,
    }
}

/// Forward (generator) power in watts: `Qe · (R/Q) · |drive|² / 2`.
pub fn forward_power(cavity: &CavityConfig, qe: f64, loaded_q: f64, detuning_hz: f64) -> f64 {
    qe * cavity.r_over_q_ohm * drive(cavity, loaded_q, detuning_hz).norm_sqr() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tesla_cavity() -> CavityConfig {
        CavityConfig {
            resonant_frequency_hz: 1.3e9,
            cavity_voltage_v: 2.0e7,
            intrinsic_q: 1.0e10,
            r_over_q_ohm: 1036.0,
        }
    }

    fn assert_close(a: f64, b: f64, rel: f64) {
        assert!(
            (a - b).abs() <= rel * b.abs().max(1e-12),
            "{a} not within {rel} of {b}"
        );
    }

    #[test]
    fn parallel_q_combines_and_skips_invalid_terms() {
        assert_close(parallel_q(&[2.0, 2.0]), 1.0, 1e-12);
        assert_close(parallel_q(&[4.0, 0.0, f64::NAN, -3.0]), 4.0, 1e-12);
        assert_eq!(parallel_q(&[]), 0.0);
        assert_eq!(parallel_q(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn scaling_uses_offset_and_half_range() {
        let d = scale_detuning(0.034_688_375, 20.0, 0.034_688_375);
        assert_close(d, 0.693_767_5, 1e-9);
    }

    #[test]
    fn secondary_detuning_is_zero_inside_half_range() {
        assert_eq!(feedback_limited_detuning(0.6938, 25.0), 0.0);
        assert_eq!(feedback_limited_detuning(-12.5, 25.0), 0.0);
    }

    #[test]
    fn secondary_detuning_keeps_sign_of_excess() {
        assert_close(feedback_limited_detuning(20.0, 25.0), 7.5, 1e-12);
        assert_close(feedback_limited_detuning(-20.0, 25.0), -7.5, 1e-12);
    }

    #[test]
    fn loaded_q_matches_formulas() {
        let cavity = tesla_cavity();
        let q = loaded_q(&cavity, 20.0, 4.0e8, 20.0, 25.0);
        assert_close(q.qe_opt, 1.3e9 / 20.0, 1e-12);
        assert_close(q.q_frt, 20.0 * 1.3e9 / 25.0, 1e-12);
        assert_close(q.ql, 1.0 / (1.0 / 4.0e8 + 1.0 / 1.0e10), 1e-12);
        assert_close(
            q.ql_frt,
            1.0 / (1.0 / 4.0e8 + 1.0 / 1.0e10 + 1.0 / q.q_frt),
            1e-12,
        );
        assert!(q.ql_frt < q.ql);
    }

    #[test]
    fn zero_cavity_gives_zero_everything() {
        let cavity = CavityConfig::default();
        let q = loaded_q(&cavity, 20.0, 4.0e8, 20.0, 25.0);
        assert_eq!(q.qe_opt, 0.0);
        assert_eq!(q.q_frt, 0.0);
        assert_eq!(q.qe_opt_frt, 0.0);
        assert_close(q.ql, 4.0e8, 1e-12);
        let p = forward_power(&cavity, 4.0e8, q.ql, 5.0);
        assert_eq!(p, 0.0);
        assert!(p.is_finite());
    }

    #[test]
    fn power_matches_textbook_expression() {
        // P = Vc² · Qe / (4 · R/Q · QL²) · (1 + (2·QL·Δf/f0)²)
        let cavity = tesla_cavity();
        let qe = 4.0e8;
        let ql = parallel_q(&[qe, cavity.intrinsic_q]);
        for df in [0.0, 3.0, -10.0] {
            let tan = 2.0 * ql * df / cavity.resonant_frequency_hz;
            let expected = cavity.cavity_voltage_v.powi(2) * qe
                / (4.0 * cavity.r_over_q_ohm * ql * ql)
                * (1.0 + tan * tan);
            assert_close(forward_power(&cavity, qe, ql, df), expected, 1e-9);
        }
    }

    #[test]
    fn power_is_symmetric_and_grows_with_detuning() {
        let cavity = tesla_cavity();
        let ql = parallel_q(&[4.0e8, cavity.intrinsic_q]);
        let p0 = forward_power(&cavity, 4.0e8, ql, 0.0);
        let p5 = forward_power(&cavity, 4.0e8, ql, 5.0);
        let m5 = forward_power(&cavity, 4.0e8, ql, -5.0);
        assert!(p5 > p0);
        assert_close(p5, m5, 1e-12);
    }
}
