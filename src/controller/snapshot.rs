//! # Snapshot Module
//!
//! Immutable readings of the selected device and the roster of its inputs.
//!
//! ## Standard Layout
//!
//! Devices reporting the standard gamepad layout get named inputs:
//!
//! | Index | Button | Axis |
//! |-------|--------|------|
//! | 0 | A | Left Stick X |
//! | 1 | B | Left Stick Y |
//! | 2 | X | Right Stick X |
//! | 3 | Y | Right Stick Y |
//! | 4-7 | LB, RB, LT, RT | - |
//! | 8-11 | Select, Start, L3, R3 | - |
//! | 12-15 | D-Pad Up, Down, Left, Right | - |
//!
//! Everything else is labelled `Button N` / `Axis N`.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use super::actions::InputKind;
use super::device::{DeviceInfo, RawDeviceState};
use super::mapping::Mapping;

/// Axis count reported while no device is connected.
pub const DISCONNECTED_AXIS_COUNT: usize = 4;

/// A button counts as pressed above this analog value.
pub const BUTTON_PRESS_THRESHOLD: f32 = 0.5;

const STANDARD_BUTTON_LABELS: [&str; 16] = [
    "A",
    "B",
    "X",
    "Y",
    "LB",
    "RB",
    "LT",
    "RT",
    "Select",
    "Start",
    "L3",
    "R3",
    "D-Pad Up",
    "D-Pad Down",
    "D-Pad Left",
    "D-Pad Right",
];

const STANDARD_AXIS_LABELS: [&str; 4] = ["Left Stick X", "Left Stick Y", "Right Stick X", "Right Stick Y"];

/// Identifier of a physical input, rendered as `button-N` / `axis-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputId {
    pub kind: InputKind,
    pub index: usize,
}

impl InputId {
    #[must_use]
    pub fn button(index: usize) -> Self {
        Self {
            kind: InputKind::Button,
            index,
        }
    }

    #[must_use]
    pub fn axis(index: usize) -> Self {
        Self {
            kind: InputKind::Axis,
            index,
        }
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.index)
    }
}

/// One physical control of the selected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    pub id: InputId,
    pub label: String,
}

/// Buttons and axes of the selected device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInputs {
    pub buttons: Vec<RawInput>,
    pub axes: Vec<RawInput>,
}

impl DeviceInputs {
    /// Builds the input roster for a device.
    #[must_use]
    pub fn for_device(info: &DeviceInfo) -> Self {
        let buttons = (0..info.button_count)
            .map(|i| RawInput {
                id: InputId::button(i),
                label: match STANDARD_BUTTON_LABELS.get(i) {
                    Some(label) if info.standard_layout => (*label).to_string(),
                    _ => format!("Button {}", i),
                },
            })
            .collect();

        let axes = (0..info.axis_count)
            .map(|i| RawInput {
                id: InputId::axis(i),
                label: match STANDARD_AXIS_LABELS.get(i) {
                    Some(label) if info.standard_layout => (*label).to_string(),
                    _ => format!("Axis {}", i),
                },
            })
            .collect();

        Self { buttons, axes }
    }

    /// Label of the input a mapping points at.
    #[must_use]
    pub fn label_for(&self, mapping: &Mapping) -> &str {
        let Some(index) = mapping.input_index() else {
            return "Unmapped";
        };
        match mapping.kind {
            InputKind::Button => self
                .buttons
                .get(index)
                .map_or("Unknown Button", |input| input.label.as_str()),
            InputKind::Axis => self
                .axes
                .get(index)
                .map_or("Unknown Axis", |input| input.label.as_str()),
        }
    }
}

/// One immutable reading of the selected device.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub connected: bool,
    pub pressed: BTreeSet<InputId>,
    pub axis_values: Vec<f32>,
    pub taken_at: Instant,
}

impl Snapshot {
    /// Reading for "no usable device": nothing pressed, axes at zero.
    #[must_use]
    pub fn disconnected(at: Instant) -> Self {
        Self {
            connected: false,
            pressed: BTreeSet::new(),
            axis_values: vec![0.0; DISCONNECTED_AXIS_COUNT],
            taken_at: at,
        }
    }

    /// Reading built from raw device state.
    #[must_use]
    pub fn from_raw(state: &RawDeviceState, at: Instant) -> Self {
        let pressed = state
            .buttons
            .iter()
            .enumerate()
            .filter(|(_, button)| button.pressed)
            .map(|(i, _)| InputId::button(i))
            .collect();

        Self {
            connected: true,
            pressed,
            axis_values: state.axes.clone(),
            taken_at: at,
        }
    }

    #[must_use]
    pub fn is_pressed(&self, id: InputId) -> bool {
        self.pressed.contains(&id)
    }

    /// Axis reading, 0.0 for indices the device does not have.
    #[must_use]
    pub fn axis(&self, index: usize) -> f32 {
        self.axis_values.get(index).copied().unwrap_or(0.0)
    }

    /// Equality of everything but the timestamp.
    #[must_use]
    pub fn same_state(&self, other: &Snapshot) -> bool {
        self.connected == other.connected
            && self.pressed == other.pressed
            && self.axis_values == other.axis_values
    }
}
