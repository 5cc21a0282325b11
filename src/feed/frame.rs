//! Render frames: everything a render surface needs for one refresh.

use serde::Serialize;

use super::axis::Axes;
use crate::cache::DerivedValues;
use crate::config::defaults::{INACTIVE_PATH_ALPHA, INPUT_PANEL_MARGIN};
use crate::controls::ControlState;
use crate::types::{Colour, ControlVariable, ResultRecord};

/// One plotted sample with the colour it was plotted in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotPoint {
    pub record: ResultRecord,
    pub colour: Colour,
}

/// How a path's points are painted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Paint {
    /// Each point keeps the rotating colour it was sampled with.
    PerPoint,
    Solid(Colour),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathStyle {
    pub paint: Paint,
    pub alpha: f64,
}

/// Styling of both feedback paths and their average lines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Styling {
    pub primary: PathStyle,
    pub secondary: PathStyle,
    pub primary_average: PathStyle,
    pub secondary_average: PathStyle,
}

impl Styling {
    /// The FRT flag selects which path is highlighted.
    pub fn for_mode(frt_on: bool, latest_colour: Colour) -> Self {
        let active = PathStyle {
            paint: Paint::PerPoint,
            alpha: 1.0,
        };
        let active_line = PathStyle {
            paint: Paint::Solid(latest_colour),
            alpha: 1.0,
        };
        let inactive = PathStyle {
            paint: Paint::Solid(Colour::LIGHT_GREY),
            alpha: INACTIVE_PATH_ALPHA,
        };

        if frt_on {
            Self {
                primary: inactive,
                secondary: active,
                primary_average: inactive,
                secondary_average: active_line,
            }
        } else {
            Self {
                primary: active,
                secondary: inactive,
                primary_average: active_line,
                secondary_average: inactive,
            }
        }
    }
}

/// Live input bar panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputPanel {
    /// Linear-scale bars: FRT_On then the sliders except Qe.
    pub bars: Vec<(ControlVariable, f64)>,
    /// Upper limit of the linear bar axis
    pub ylim: f64,
    pub qe: f64,
    /// Qe optimum for the active feedback mode
    pub qe_opt_marker: f64,
}

impl InputPanel {
    pub fn new(inputs: &ControlState, derived: &DerivedValues) -> Self {
        let bars = inputs
            .iter()
            .filter(|v| v.name != ControlVariable::Qe)
            .map(|v| (v.name, v.value))
            .collect();
        let ylim = [
            ControlVariable::FoM,
            ControlVariable::UphonicsRange,
            ControlVariable::TuningRange,
        ]
        .iter()
        .map(|&v| inputs.get(v))
        .fold(0.0, f64::max)
            * INPUT_PANEL_MARGIN;

        let qe_opt_marker = if inputs.frt_on() {
            derived.loaded_q.qe_opt_frt
        } else {
            derived.loaded_q.qe_opt
        };

        Self {
            bars,
            ylim,
            qe: inputs.get(ControlVariable::Qe),
            qe_opt_marker,
        }
    }
}

/// Snapshot published after every consumed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    /// Batches consumed so far, starting at 1
    pub sequence: u64,
    /// Records of the batch that produced this frame, oldest first
    pub batch: Vec<ResultRecord>,
    /// Current window contents, oldest first
    pub window: Vec<PlotPoint>,
    pub derived: DerivedValues,
    pub inputs: InputPanel,
    pub axes: Axes,
    pub styling: Styling,
}

impl Frame {
    pub fn frt_on(&self) -> bool {
        self.inputs
            .bars
            .iter()
            .any(|&(v, value)| v == ControlVariable::FrtOn && value > 0.0)
    }

    /// Latest `(avg_power, avg_power_secondary)`, for the horizontal average
    /// line of the power-vs-detuning plot.
    pub fn latest_average(&self) -> Option<(f64, f64)> {
        self.window
            .last()
            .map(|p| (p.record.avg_power, p.record.avg_power_secondary))
    }

    /// Detuning span of the window, for the extent of the average line.
    pub fn detuning_span(&self) -> Option<(f64, f64)> {
        let mut values = self.window.iter().map(|p| p.record.detuning);
        let first = values.next()?;
        Some(values.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::VariableStore;

    #[test]
    fn frt_mode_swaps_highlighted_path() {
        let red = Colour::rgb(255, 0, 0);
        let off = Styling::for_mode(false, red);
        assert_eq!(off.primary.paint, Paint::PerPoint);
        assert_eq!(off.primary.alpha, 1.0);
        assert_eq!(off.primary_average.paint, Paint::Solid(red));
        assert_eq!(off.secondary.paint, Paint::Solid(Colour::LIGHT_GREY));
        assert_eq!(off.secondary.alpha, 0.5);

        let on = Styling::for_mode(true, red);
        assert_eq!(on.secondary.paint, Paint::PerPoint);
        assert_eq!(on.primary.alpha, 0.5);
        assert_eq!(on.primary_average.paint, Paint::Solid(Colour::LIGHT_GREY));
    }

    #[test]
    fn input_panel_limit_and_marker_follow_mode() {
        let mut store = VariableStore::new(ControlState::default());
        store.set(ControlVariable::TuningRange, 50.0);
        let mut derived = DerivedValues::default();
        derived.loaded_q.qe_opt = 1.0;
        derived.loaded_q.qe_opt_frt = 2.0;

        let panel = InputPanel::new(&store.snapshot(), &derived);
        assert!((panel.ylim - 60.0).abs() < 1e-12);
        assert_eq!(panel.qe, 4.0e8);
        assert_eq!(panel.qe_opt_marker, 1.0);
        assert_eq!(panel.bars.len(), 4);
        assert_eq!(panel.bars[0].0, ControlVariable::FrtOn);

        store.set(ControlVariable::FrtOn, 1.0);
        let panel = InputPanel::new(&store.snapshot(), &derived);
        assert_eq!(panel.qe_opt_marker, 2.0);
    }
}
