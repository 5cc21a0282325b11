//! Variable Store - the single source of truth for operator control state.
//!
//! The store is an owned object with exactly one writer (the input driver).
//! Every other component holds a [`StoreReader`], a read-only handle backed by
//! a `tokio::sync::watch` channel, so readers can never write back.

pub mod driver;
pub mod stdin_surface;
pub mod surface;

pub use driver::{DriverStats, InputDriver};
pub use stdin_surface::StdinSurface;
pub use surface::{
    ControlMap, ControlMessage, ControlSurface, DeviceError, NullSurface, ScriptedSurface,
};

use serde::Serialize;
use tokio::sync::watch;

use crate::config::ControlsConfig;
use crate::types::ControlVariable;

// ============================================================================
// Variables
// ============================================================================

/// A named control value and its valid range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Variable {
    pub name: ControlVariable,
    pub value: f64,
    pub range: Option<(f64, f64)>,
}

impl Variable {
    /// Clamp a candidate value into this variable's range.
    pub fn clamp(&self, value: f64) -> f64 {
        match self.range {
            Some((min, max)) => value.clamp(min, max),
            None if self.name.is_toggle() => {
                if value > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            None => value,
        }
    }
}

/// Snapshot of every control variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlState {
    variables: [Variable; 5],
}

impl ControlState {
    /// Build the initial state from the config section.
    pub fn from_config(config: &ControlsConfig) -> Self {
        let variables = ControlVariable::ALL.map(|name| Variable {
            name,
            value: config.initial_value(name),
            range: config.setting(name).map(|s| (s.min, s.max)),
        });
        Self { variables }
    }

    fn index(var: ControlVariable) -> usize {
        match var {
            ControlVariable::FrtOn => 0,
            ControlVariable::FoM => 1,
            ControlVariable::UphonicsRange => 2,
            ControlVariable::Qe => 3,
            ControlVariable::TuningRange => 4,
        }
    }

    pub fn variable(&self, var: ControlVariable) -> &Variable {
        &self.variables[Self::index(var)]
    }

    pub fn get(&self, var: ControlVariable) -> f64 {
        self.variable(var).value
    }

    pub fn frt_on(&self) -> bool {
        self.get(ControlVariable::FrtOn) > 0.0
    }

    /// Variables in dashboard order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Set a value (clamped to range). Returns true if the value changed.
    fn set(&mut self, var: ControlVariable, value: f64) -> bool {
        let slot = &mut self.variables[Self::index(var)];
        let clamped = slot.clamp(value);
        if slot.value == clamped {
            return false;
        }
        slot.value = clamped;
        true
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::from_config(&ControlsConfig::default())
    }
}

// ============================================================================
// Store
// ============================================================================

/// Owner of the control state. Not `Clone`: there is exactly one writer.
#[derive(Debug)]
pub struct VariableStore {
    tx: watch::Sender<ControlState>,
}

impl VariableStore {
    pub fn new(initial: ControlState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn from_config(config: &ControlsConfig) -> Self {
        Self::new(ControlState::from_config(config))
    }

    /// Hand out a read-only handle.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Update one variable. Returns true if the stored value changed.
    pub fn set(&mut self, var: ControlVariable, value: f64) -> bool {
        self.tx.send_if_modified(|state| state.set(var, value))
    }

    pub fn snapshot(&self) -> ControlState {
        *self.tx.borrow()
    }
}

/// Read-only view of the [`VariableStore`].
#[derive(Debug, Clone)]
pub struct StoreReader {
    rx: watch::Receiver<ControlState>,
}

impl StoreReader {
    /// Current state. Keeps working after the writer has gone away.
    pub fn snapshot(&self) -> ControlState {
        *self.rx.borrow()
    }

    pub fn get(&self, var: ControlVariable) -> f64 {
        self.rx.borrow().get(var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_matches_config() {
        let state = ControlState::default();
        assert_eq!(state.get(ControlVariable::FoM), 20.0);
        assert_eq!(state.get(ControlVariable::Qe), 4.0e8);
        assert_eq!(state.variable(ControlVariable::Qe).range, Some((1.0e7, 1.0e10)));
        assert_eq!(state.variable(ControlVariable::FrtOn).range, None);
        assert!(!state.frt_on());
    }

    #[test]
    fn readers_see_writes() {
        let mut store = VariableStore::new(ControlState::default());
        let reader = store.reader();
        assert!(store.set(ControlVariable::TuningRange, 40.0));
        assert_eq!(reader.get(ControlVariable::TuningRange), 40.0);
    }

    #[test]
    fn unchanged_value_reports_no_change() {
        let mut store = VariableStore::new(ControlState::default());
        assert!(!store.set(ControlVariable::FoM, 20.0));
    }

    #[test]
    fn values_are_clamped_to_range() {
        let mut store = VariableStore::new(ControlState::default());
        store.set(ControlVariable::UphonicsRange, 500.0);
        assert_eq!(store.snapshot().get(ControlVariable::UphonicsRange), 100.0);
        store.set(ControlVariable::FrtOn, 0.7);
        assert!(store.snapshot().frt_on());
        assert_eq!(store.snapshot().get(ControlVariable::FrtOn), 1.0);
    }

    #[test]
    fn reader_outlives_writer() {
        let mut store = VariableStore::new(ControlState::default());
        let reader = store.reader();
        store.set(ControlVariable::FoM, 55.0);
        drop(store);
        assert_eq!(reader.get(ControlVariable::FoM), 55.0);
    }
}
