//! Simulator Configuration - cavity constants, control ranges and pipeline tuning
//!
//! Every section implements `Default`. Cavity constants default to zero so that
//! a missing config degrades to zero-valued physics rather than invented numbers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::ControlVariable;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "FRT_SIM_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "simulator_config.toml";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Failed to parse {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of one simulator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Physical constants of the cavity
    #[serde(default)]
    pub cavity: CavityConfig,

    /// Initial values and ranges of the operator controls
    #[serde(default)]
    pub controls: ControlsConfig,

    /// Queue sizes, batching and timing of the streaming pipeline
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Detuning dataset location
    #[serde(default)]
    pub dataset: DatasetConfig,
}

impl SimConfig {
    /// Load configuration using the standard search order.
    ///
    /// Never fails: every problem is logged and the next candidate (finally the
    /// built-in defaults) is used.
    pub fn load(explicit: Option<&Path>) -> Self {
        // 1. Command-line path
        if let Some(path) = explicit {
            match Self::load_from_file(path) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded simulator config");
                    return config;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load simulator config, using zero cavity constants");
                    return Self::default();
                }
            }
        }

        // 2. Env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded simulator config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 3. ./simulator_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded simulator config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 4. Defaults
        warn!("No usable simulator config found - cavity constants are zero, physics will be degenerate");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents, path)
    }

    /// Parse and validate TOML text. `origin` is only used in error messages.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(origin.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate ranges and pipeline sizes.
    ///
    /// Rules:
    /// - Every slider range must satisfy `min < max` and contain its value
    /// - Qe range must be strictly positive (log scaling)
    /// - Queue capacity, batch size and window must be > 0
    /// - Cavity constants must be finite and non-negative
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = super::validation::validate_physical_ranges(self);

        let p = &self.pipeline;
        if p.results_queue_capacity == 0 {
            errors.push("pipeline.results_queue_capacity must be > 0".to_string());
        }
        if p.batch_size == 0 {
            errors.push("pipeline.batch_size must be > 0".to_string());
        }
        if p.window_samples == 0 {
            errors.push("pipeline.window_samples must be > 0".to_string());
        }
        if !p.colour_interval_secs.is_finite() || p.colour_interval_secs < 0.0 {
            errors.push(format!(
                "pipeline.colour_interval_secs must be a finite value >= 0 (got {})",
                p.colour_interval_secs
            ));
        }
        if let Some(offset) = p.wrap_offset_secs {
            if !offset.is_finite() || offset <= 0.0 {
                errors.push(format!(
                    "pipeline.wrap_offset_secs must be a finite value > 0 (got {offset})"
                ));
            }
        }
        if !p.detuning_offset.is_finite() {
            errors.push("pipeline.detuning_offset must be finite".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Cavity
// ============================================================================

/// Physical constants of the simulated cavity.
///
/// `r_over_q_ohm` uses the accelerator convention (`Vc² / (ω·U)`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CavityConfig {
    /// Resonant frequency f0 (Hz)
    pub resonant_frequency_hz: f64,
    /// Accelerating voltage Vc (V)
    pub cavity_voltage_v: f64,
    /// Intrinsic quality factor Q0
    pub intrinsic_q: f64,
    /// Characteristic impedance R/Q (Ω)
    pub r_over_q_ohm: f64,
}

impl CavityConfig {
    /// True when every constant is zero (the degraded configuration).
    pub fn is_degenerate(&self) -> bool {
        self.resonant_frequency_hz == 0.0
            && self.cavity_voltage_v == 0.0
            && self.intrinsic_q == 0.0
            && self.r_over_q_ohm == 0.0
    }
}

// ============================================================================
// Controls
// ============================================================================

/// Initial value and slider range of one control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlSetting {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl ControlSetting {
    pub const fn new(value: f64, min: f64, max: f64) -> Self {
        Self { value, min, max }
    }
}

/// Initial state of the on/off switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToggleSetting {
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fom: ControlSetting,
    pub uphonics_range: ControlSetting,
    pub qe: ControlSetting,
    pub tuning_range: ControlSetting,
    pub frt_on: ToggleSetting,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fom: ControlSetting::new(20.0, 0.1, 100.0),
            uphonics_range: ControlSetting::new(20.0, 0.1, 100.0),
            qe: ControlSetting::new(4.0e8, 1.0e7, 1.0e10),
            tuning_range: ControlSetting::new(25.0, 0.1, 100.0),
            frt_on: ToggleSetting { value: 0.0 },
        }
    }
}

impl ControlsConfig {
    /// Slider setting of a control; `None` for the toggle.
    pub const fn setting(&self, var: ControlVariable) -> Option<ControlSetting> {
        match var {
            ControlVariable::FoM => Some(self.fom),
            ControlVariable::UphonicsRange => Some(self.uphonics_range),
            ControlVariable::Qe => Some(self.qe),
            ControlVariable::TuningRange => Some(self.tuning_range),
            ControlVariable::FrtOn => None,
        }
    }

    /// Initial value of a control.
    pub const fn initial_value(&self, var: ControlVariable) -> f64 {
        match self.setting(var) {
            Some(s) => s.value,
            None => self.frt_on.value,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the bounded producer -> consumer queue
    pub results_queue_capacity: usize,
    /// Records per consumer batch
    pub batch_size: usize,
    /// Ring-buffer capacity of each plotted series
    pub window_samples: usize,
    /// Minimum seconds between plotting colour advances
    pub colour_interval_secs: f64,
    /// Time added per dataset wraparound; measured from the dataset when unset
    pub wrap_offset_secs: Option<f64>,
    /// Delay between produced samples (ms)
    pub sample_delay_ms: u64,
    /// Render loop refresh interval (ms)
    pub render_interval_ms: u64,
    /// Offset added to raw detuning before scaling
    pub detuning_offset: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            results_queue_capacity: defaults::RESULTS_QUEUE_CAPACITY,
            batch_size: defaults::BATCH_SIZE,
            window_samples: defaults::WINDOW_SAMPLES,
            colour_interval_secs: defaults::COLOUR_INTERVAL_SECS,
            wrap_offset_secs: None,
            sample_delay_ms: defaults::SAMPLE_DELAY_MS,
            render_interval_ms: defaults::RENDER_INTERVAL_MS,
            detuning_offset: defaults::DETUNING_OFFSET,
        }
    }
}

// ============================================================================
// Dataset
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// CSV file with `time` and `detuning` columns; synthetic trace when unset
    pub path: Option<PathBuf>,
}
