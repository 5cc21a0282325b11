//! Simulator Configuration Module
//!
//! Physical cavity constants, control defaults and pipeline tuning loaded
//! from a TOML file.
//!
//! ## Loading Order
//!
//! 1. Path passed on the command line (`--config`)
//! 2. `FRT_SIM_CONFIG` environment variable (path to TOML file)
//! 3. `simulator_config.toml` in the current working directory
//! 4. Built-in defaults
//!
//! A file that cannot be read, parsed or validated is never fatal: the
//! loader logs the problem and falls back to the built-in defaults, whose
//! cavity constants are all zero. The pipeline then runs with degenerate
//! (zero-power) physics instead of aborting.

mod sim_config;
pub mod defaults;
pub mod validation;

pub use sim_config::*;
