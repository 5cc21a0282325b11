//! Control surface abstraction.
//!
//! A control surface delivers raw controller messages (control change, note
//! on, or a direct named set). [`ControlMap`] turns them into variable
//! updates using the ranges carried by the current [`ControlState`].

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use super::ControlState;
use crate::config::defaults::{
    CC_FOM, CC_QE, CC_TUNING_RANGE, CC_UPHONICS_RANGE, CONTROLLER_FULL_SCALE, NOTE_FRT_TOGGLE,
};
use crate::types::{ControlError, ControlVariable};

/// Status byte (high nibble) of a control change message.
const STATUS_CONTROL_CHANGE: u8 = 0xB0;
/// Status byte (high nibble) of a note on message.
const STATUS_NOTE_ON: u8 = 0x90;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Control surface unavailable: {0}")]
    Unavailable(String),

    #[error("Control surface I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed control message: {0}")]
    Malformed(String),
}

/// One message from a control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMessage {
    /// Slider / knob moved. `value` is 0-127.
    ControlChange { control: u8, value: u8 },
    /// Button pressed (velocity > 0) or released (velocity 0).
    NoteOn { note: u8, velocity: u8 },
    /// Direct assignment of a named variable, bypassing the controller mapping.
    Set { variable: ControlVariable, value: f64 },
}

impl ControlMessage {
    /// Decode a raw 3-byte controller message. Other message kinds yield `None`.
    pub fn from_raw(status: u8, data1: u8, data2: u8) -> Option<Self> {
        match status & 0xF0 {
            STATUS_CONTROL_CHANGE => Some(Self::ControlChange {
                control: data1,
                value: data2,
            }),
            STATUS_NOTE_ON => Some(Self::NoteOn {
                note: data1,
                velocity: data2,
            }),
            _ => None,
        }
    }
}

/// Controller number -> variable mapping.
#[derive(Debug, Clone)]
pub struct ControlMap {
    controls: HashMap<u8, ControlVariable>,
}

impl Default for ControlMap {
    fn default() -> Self {
        Self::new([
            (CC_FOM, ControlVariable::FoM),
            (CC_TUNING_RANGE, ControlVariable::TuningRange),
            (CC_UPHONICS_RANGE, ControlVariable::UphonicsRange),
            (CC_QE, ControlVariable::Qe),
            (NOTE_FRT_TOGGLE, ControlVariable::FrtOn),
        ])
    }
}

impl ControlMap {
    pub fn new(entries: impl IntoIterator<Item = (u8, ControlVariable)>) -> Self {
        Self {
            controls: entries.into_iter().collect(),
        }
    }

    pub fn lookup(&self, control: u8) -> Result<ControlVariable, ControlError> {
        self.controls
            .get(&control)
            .copied()
            .ok_or(ControlError::UnknownControl(control))
    }

    /// Translate a message into the target variable and its new value.
    ///
    /// Unmapped controllers resolve to `None`.
    pub fn resolve(
        &self,
        message: ControlMessage,
        state: &ControlState,
    ) -> Option<(ControlVariable, f64)> {
        match message {
            ControlMessage::ControlChange { control, value } => {
                let variable = self.lookup(control).ok()?;
                Some((variable, scale_controller(variable, value, state)))
            }
            ControlMessage::NoteOn { note, velocity } => {
                let variable = self.lookup(note).ok()?;
                Some((variable, if velocity > 0 { 1.0 } else { 0.0 }))
            }
            ControlMessage::Set { variable, value } => Some((variable, value)),
        }
    }
}

/// Scale a 0-127 controller value into the variable's range.
///
/// Linear for sliders, logarithmic for [`ControlVariable::is_logarithmic`].
/// A toggle without a range is on for any non-zero value.
fn scale_controller(variable: ControlVariable, raw: u8, state: &ControlState) -> f64 {
    let fraction = f64::from(raw) / CONTROLLER_FULL_SCALE;
    match state.variable(variable).range {
        Some((min, max)) if variable.is_logarithmic() && min > 0.0 => {
            min * (max / min).powf(fraction)
        }
        Some((min, max)) => min + fraction * (max - min),
        None => {
            if raw > 0 {
                1.0
            } else {
                0.0
            }
        }
    }
}

// ============================================================================
// Surfaces
// ============================================================================

/// Where control messages come from.
///
/// The input driver calls [`next_message`](ControlSurface::next_message) in
/// a select! with cancellation.
#[async_trait]
pub trait ControlSurface: Send + 'static {
    /// Wait for the next message. `Ok(None)` means the surface has closed.
    async fn next_message(&mut self) -> Result<Option<ControlMessage>, DeviceError>;

    /// Human-readable name for logging.
    fn surface_name(&self) -> &str;
}

/// Surface with no device attached. Closes immediately.
#[derive(Debug, Default)]
pub struct NullSurface;

#[async_trait]
impl ControlSurface for NullSurface {
    async fn next_message(&mut self) -> Result<Option<ControlMessage>, DeviceError> {
        Ok(None)
    }

    fn surface_name(&self) -> &str {
        "none"
    }
}

/// Replays a fixed list of messages (and errors), then closes.
#[derive(Debug, Default)]
pub struct ScriptedSurface {
    script: VecDeque<Result<ControlMessage, DeviceError>>,
}

impl ScriptedSurface {
    pub fn new(script: impl IntoIterator<Item = Result<ControlMessage, DeviceError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn from_messages(messages: impl IntoIterator<Item = ControlMessage>) -> Self {
        Self::new(messages.into_iter().map(Ok))
    }
}

#[async_trait]
impl ControlSurface for ScriptedSurface {
    async fn next_message(&mut self) -> Result<Option<ControlMessage>, DeviceError> {
        self.script.pop_front().transpose()
    }

    fn surface_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_messages_decode_by_status_nibble() {
        assert_eq!(
            ControlMessage::from_raw(176, 36, 64),
            Some(ControlMessage::ControlChange {
                control: 36,
                value: 64
            })
        );
        assert_eq!(
            ControlMessage::from_raw(0x91, 40, 0),
            Some(ControlMessage::NoteOn {
                note: 40,
                velocity: 0
            })
        );
        assert_eq!(ControlMessage::from_raw(0xE0, 0, 0), None);
    }

    #[test]
    fn sliders_scale_linearly_into_range() {
        let map = ControlMap::default();
        let state = ControlState::default();

        let (var, low) = map
            .resolve(ControlMessage::ControlChange { control: 36, value: 0 }, &state)
            .unwrap();
        assert_eq!(var, ControlVariable::FoM);
        assert!((low - 0.1).abs() < 1e-12);

        let (_, high) = map
            .resolve(ControlMessage::ControlChange { control: 37, value: 127 }, &state)
            .unwrap();
        assert!((high - 100.0).abs() < 1e-9);
    }

    #[test]
    fn qe_scales_logarithmically() {
        let map = ControlMap::default();
        let state = ControlState::default();
        let resolve = |value| {
            map.resolve(ControlMessage::ControlChange { control: 39, value }, &state)
                .unwrap()
                .1
        };
        assert!((resolve(0) - 1.0e7).abs() < 1.0);
        assert!((resolve(127) / 1.0e10 - 1.0).abs() < 1e-9);
        let mid = 1.0e7 * 1000f64.powf(64.0 / 127.0);
        assert!((resolve(64) / mid - 1.0).abs() < 1e-9);
    }

    #[test]
    fn note_on_sets_toggle_from_velocity() {
        let map = ControlMap::default();
        let state = ControlState::default();
        assert_eq!(
            map.resolve(ControlMessage::NoteOn { note: 40, velocity: 100 }, &state),
            Some((ControlVariable::FrtOn, 1.0))
        );
        assert_eq!(
            map.resolve(ControlMessage::NoteOn { note: 40, velocity: 0 }, &state),
            Some((ControlVariable::FrtOn, 0.0))
        );
    }

    #[test]
    fn unmapped_controller_is_ignored() {
        let map = ControlMap::default();
        let state = ControlState::default();
        assert_eq!(
            map.resolve(ControlMessage::ControlChange { control: 1, value: 5 }, &state),
            None
        );
        assert_eq!(map.lookup(1), Err(ControlError::UnknownControl(1)));
    }

    #[tokio::test]
    async fn scripted_surface_replays_then_closes() {
        let mut surface = ScriptedSurface::new([
            Ok(ControlMessage::NoteOn { note: 40, velocity: 1 }),
            Err(DeviceError::Malformed("x".into())),
        ]);
        assert!(surface.next_message().await.unwrap().is_some());
        assert!(surface.next_message().await.is_err());
        assert!(surface.next_message().await.unwrap().is_none());
    }
}
