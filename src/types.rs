//! Core data types shared across the simulator pipeline.
//!
//! Control variables are a closed enumeration so that every name used by the
//! control surface, the config file and the dashboard resolves at startup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Control Variables
// ============================================================================

/// Errors raised when resolving a control by name or controller number.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Unknown control variable '{0}'")]
    UnknownVariable(String),

    #[error("No control variable mapped to controller {0}")]
    UnknownControl(u8),
}

/// Operator-adjustable inputs of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlVariable {
    /// Figure of merit of the ferroelectric tuner
    #[serde(rename = "FoM")]
    FoM,
    /// Peak-to-peak microphonics detuning (Hz)
    #[serde(rename = "uphonics_range")]
    UphonicsRange,
    /// External coupling quality factor
    #[serde(rename = "Qe")]
    Qe,
    /// Tuning range of the fast reactive tuner (Hz)
    #[serde(rename = "tuning_range")]
    TuningRange,
    /// Fast reactive tuner on/off toggle (0 or 1)
    #[serde(rename = "FRT_On")]
    FrtOn,
}

impl ControlVariable {
    /// All controls, in dashboard order.
    pub const ALL: [Self; 5] = [
        Self::FrtOn,
        Self::FoM,
        Self::UphonicsRange,
        Self::Qe,
        Self::TuningRange,
    ];

    /// Canonical display / config name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::FoM => "FoM",
            Self::UphonicsRange => "uphonics_range",
            Self::Qe => "Qe",
            Self::TuningRange => "tuning_range",
            Self::FrtOn => "FRT_On",
        }
    }

    /// Resolve a control from its canonical name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, ControlError> {
        let wanted = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ControlError::UnknownVariable(wanted.to_string()))
    }

    /// Whether this control is an on/off switch rather than a slider.
    pub const fn is_toggle(self) -> bool {
        matches!(self, Self::FrtOn)
    }

    /// Qe spans several decades, so its slider is logarithmic.
    pub const fn is_logarithmic(self) -> bool {
        matches!(self, Self::Qe)
    }
}

impl fmt::Display for ControlVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControlVariable {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

// ============================================================================
// Result Records
// ============================================================================

/// One simulated sample, emitted by the physics producer.
///
/// Powers are in watts, detunings in hertz and time in seconds on the
/// unwrapped (monotonic) time axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub time: f64,
    pub detuning: f64,
    pub detuning_secondary: f64,
    pub power: f64,
    pub power_secondary: f64,
    pub avg_power: f64,
    pub avg_power_secondary: f64,
}

// ============================================================================
// Colours
// ============================================================================

/// RGB colour used for the rotating plot palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Neutral colour for the inactive feedback path.
    pub const LIGHT_GREY: Self = Self::rgb(0xd3, 0xd3, 0xd3);

    /// Colour of the average lines before any sample is plotted.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_names_round_trip() {
        for var in ControlVariable::ALL {
            assert_eq!(ControlVariable::from_name(var.name()), Ok(var));
        }
    }

    #[test]
    fn control_lookup_is_case_insensitive() {
        assert_eq!("fom".parse::<ControlVariable>(), Ok(ControlVariable::FoM));
        assert_eq!(" frt_on ".parse::<ControlVariable>(), Ok(ControlVariable::FrtOn));
    }

    #[test]
    fn unknown_control_name_is_rejected() {
        assert_eq!(
            ControlVariable::from_name("Q0"),
            Err(ControlError::UnknownVariable("Q0".to_string()))
        );
    }

    #[test]
    fn colour_formats_as_hex() {
        assert_eq!(Colour::rgb(255, 0, 0).to_string(), "#ff0000");
        assert_eq!(Colour::LIGHT_GREY.to_string(), "#d3d3d3");
    }
}
