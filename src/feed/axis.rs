//! Axis bounds with rescale hysteresis.
//!
//! An axis only rescales when the data extreme leaves the band
//! `[hysteresis · bound, bound]`, which keeps the plots from jittering on
//! every batch.

use serde::Serialize;

use crate::config::defaults::{AXIS_MARGIN, AXIS_RESCALE_HYSTERESIS};

/// Upper bound of one axis (symmetric axes mirror it).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBound {
    bound: Option<f64>,
    hysteresis: f64,
    margin: f64,
}

impl Default for AxisBound {
    fn default() -> Self {
        Self::new(AXIS_RESCALE_HYSTERESIS, AXIS_MARGIN)
    }
}

impl AxisBound {
    pub fn new(hysteresis: f64, margin: f64) -> Self {
        Self {
            bound: None,
            hysteresis,
            margin,
        }
    }

    /// Feed the current data extreme. Returns true if the axis rescaled.
    pub fn update(&mut self, extreme: f64) -> bool {
        if !extreme.is_finite() {
            return false;
        }
        let rescale = match self.bound {
            None => true,
            Some(bound) => extreme > bound || extreme < self.hysteresis * bound,
        };
        if rescale {
            self.bound = Some(self.margin * extreme);
        }
        rescale
    }

    pub fn bound(&self) -> Option<f64> {
        self.bound
    }
}

/// Plot ranges handed to the render surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Axes {
    /// Symmetric detuning range `(-b, b)`
    pub detuning: (f64, f64),
    /// Power range `(0, b)`
    pub power: (f64, f64),
    /// Time range `(min t, max t)` of the window
    pub time: (f64, f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_sets_bound_with_margin() {
        let mut axis = AxisBound::default();
        assert!(axis.update(10.0));
        assert!((axis.bound().unwrap() - 10.5).abs() < 1e-12);
    }

    #[test]
    fn stays_put_inside_hysteresis_band() {
        let mut axis = AxisBound::default();
        axis.update(10.0);
        for extreme in [10.5, 9.0, 8.5] {
            assert!(!axis.update(extreme));
        }
        assert!((axis.bound().unwrap() - 10.5).abs() < 1e-12);
    }

    #[test]
    fn rescales_when_extreme_leaves_band() {
        let mut axis = AxisBound::default();
        axis.update(10.0);
        assert!(axis.update(11.0));
        assert!((axis.bound().unwrap() - 11.55).abs() < 1e-12);

        // 0.8 * 11.55 = 9.24
        assert!(axis.update(9.0));
        assert!((axis.bound().unwrap() - 9.45).abs() < 1e-12);
    }

    #[test]
    fn non_finite_extremes_are_ignored() {
        let mut axis = AxisBound::default();
        assert!(!axis.update(f64::NAN));
        assert_eq!(axis.bound(), None);
    }
}
