//! # Evdev Device Source
//!
//! Linux [`DeviceSource`] backed by `/dev/input/event*` nodes.
//!
//! ## Detection
//!
//! A node counts as a gamepad when it reports joystick or gamepad buttons
//! (`BTN_JOYSTICK`..`BTN_THUMBR` or the `BTN_DPAD_*` range). Devices with
//! `BTN_SOUTH` are treated as standard layout.
//!
//! ## Index Layout
//!
//! Standard layout devices get fixed slots so indices line up with the
//! standard labels, whether or not the device reports every key:
//!
//! - Buttons: SOUTH, EAST, WEST, NORTH, TL, TR, TL2, TR2, SELECT, START,
//!   THUMBL, THUMBR, DPAD_UP, DPAD_DOWN, DPAD_LEFT, DPAD_RIGHT, MODE, then
//!   any other supported key
//! - Axes: ABS_X, ABS_Y, ABS_RX, ABS_RY, then any other supported axis
//!
//! Pads without `BTN_DPAD_*` keys (xpad, hid-playstation) report the D-pad
//! on `ABS_HAT0X`/`ABS_HAT0Y`; their D-pad slots read the hat sign and the
//! hat axes are left out of the axis list. LT/RT carry the analog value of
//! `ABS_Z`/`ABS_RZ` when the device has them, and those axes stay listed.
//!
//! Other devices list their keys and axes in code order. Axis readings are
//! scaled from the kernel's `[minimum, maximum]` to `[-1.0, 1.0]`.

use evdev::{AbsoluteAxisType, Device, Key};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::device::{ButtonState, DeviceInfo, DeviceSource, RawDeviceState};

/// First joystick button code (`BTN_JOYSTICK`)
const JOYSTICK_KEY_FIRST: u16 = 0x120;

/// Last gamepad button code (`BTN_THUMBR`)
const GAMEPAD_KEY_LAST: u16 = 0x13e;

/// D-pad button code range (`BTN_DPAD_UP`..`BTN_DPAD_RIGHT`)
const DPAD_KEY_FIRST: u16 = 0x220;
const DPAD_KEY_LAST: u16 = 0x223;

const STANDARD_BUTTONS: [Key; 17] = [
    Key::BTN_SOUTH,
    Key::BTN_EAST,
    Key::BTN_WEST,
    Key::BTN_NORTH,
    Key::BTN_TL,
    Key::BTN_TR,
    Key::BTN_TL2,
    Key::BTN_TR2,
    Key::BTN_SELECT,
    Key::BTN_START,
    Key::BTN_THUMBL,
    Key::BTN_THUMBR,
    Key::BTN_DPAD_UP,
    Key::BTN_DPAD_DOWN,
    Key::BTN_DPAD_LEFT,
    Key::BTN_DPAD_RIGHT,
    Key::BTN_MODE,
];

/// Standard slots of the analog triggers and the axes backing them
const TRIGGER_SLOTS: [(usize, AbsoluteAxisType); 2] = [(6, AbsoluteAxisType::ABS_Z), (7, AbsoluteAxisType::ABS_RZ)];

/// Standard D-pad slots (up, down, left, right) as hat directions
const HAT_SLOTS: [(usize, AbsoluteAxisType, i32); 4] = [
    (12, AbsoluteAxisType::ABS_HAT0Y, -1),
    (13, AbsoluteAxisType::ABS_HAT0Y, 1),
    (14, AbsoluteAxisType::ABS_HAT0X, -1),
    (15, AbsoluteAxisType::ABS_HAT0X, 1),
];

/// Trigger travel (0..1) past which an analog trigger counts as pressed
const TRIGGER_PRESS_THRESHOLD: f32 = 0.1;

const STANDARD_AXES: [AbsoluteAxisType; 4] = [
    AbsoluteAxisType::ABS_X,
    AbsoluteAxisType::ABS_Y,
    AbsoluteAxisType::ABS_RX,
    AbsoluteAxisType::ABS_RY,
];

/// Whether a key code belongs to a joystick or gamepad.
fn is_gamepad_key(key: Key) -> bool {
    let code = key.code();
    (JOYSTICK_KEY_FIRST..=GAMEPAD_KEY_LAST).contains(&code) || (DPAD_KEY_FIRST..=DPAD_KEY_LAST).contains(&code)
}

/// Where a button slot reads its state from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonSource {
    Key(Key),
    /// Trigger key plus its analog axis
    Trigger(Key, AbsoluteAxisType),
    /// One direction (-1 or 1) of a hat axis
    Hat(AbsoluteAxisType, i32),
}

/// One absolute axis reading with its kernel range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AbsReading {
    value: i32,
    minimum: i32,
    maximum: i32,
}

/// Whether the D-pad of a standard device comes from the hat axes.
fn uses_hat_dpad(keys: &[Key], abs: &[AbsoluteAxisType], standard: bool) -> bool {
    standard
        && !keys.iter().any(|k| (DPAD_KEY_FIRST..=DPAD_KEY_LAST).contains(&k.code()))
        && abs.contains(&AbsoluteAxisType::ABS_HAT0X)
        && abs.contains(&AbsoluteAxisType::ABS_HAT0Y)
}

/// Button index layout for a device's supported keys and axes.
fn order_buttons(keys: &[Key], abs: &[AbsoluteAxisType], standard: bool) -> Vec<ButtonSource> {
    let mut sorted = keys.to_vec();
    sorted.sort_by_key(|k| k.code());
    if !standard {
        return sorted.into_iter().map(ButtonSource::Key).collect();
    }

    let mut order: Vec<ButtonSource> = STANDARD_BUTTONS.iter().copied().map(ButtonSource::Key).collect();
    for (slot, axis) in TRIGGER_SLOTS {
        if abs.contains(&axis) {
            order[slot] = ButtonSource::Trigger(STANDARD_BUTTONS[slot], axis);
        }
    }
    if uses_hat_dpad(keys, abs, standard) {
        for (slot, axis, direction) in HAT_SLOTS {
            order[slot] = ButtonSource::Hat(axis, direction);
        }
    }
    order.extend(
        sorted
            .into_iter()
            .filter(|k| !STANDARD_BUTTONS.contains(k))
            .map(ButtonSource::Key),
    );
    order
}

/// Axis index order for a device's supported absolute axes.
///
/// Hat axes feeding the D-pad slots are not listed.
fn order_axes(supported: &[AbsoluteAxisType], standard: bool, hat_dpad: bool) -> Vec<AbsoluteAxisType> {
    let mut sorted: Vec<AbsoluteAxisType> = supported
        .iter()
        .copied()
        .filter(|a| !(hat_dpad && (*a == AbsoluteAxisType::ABS_HAT0X || *a == AbsoluteAxisType::ABS_HAT0Y)))
        .collect();
    sorted.sort_by_key(|a| a.0);
    if !standard {
        return sorted;
    }
    let mut order = STANDARD_AXES.to_vec();
    order.extend(sorted.into_iter().filter(|a| !STANDARD_AXES.contains(a)));
    order
}

/// Scales a kernel axis value to `[-1.0, 1.0]`.
///
/// Degenerate ranges read as 0.0.
fn scale_axis(value: i32, minimum: i32, maximum: i32) -> f32 {
    if maximum <= minimum {
        return 0.0;
    }
    let span = (i64::from(maximum) - i64::from(minimum)) as f32;
    let offset = (i64::from(value) - i64::from(minimum)) as f32;
    let scaled = 2.0 * offset / span - 1.0;
    scaled.clamp(-1.0, 1.0)
}

/// Reads one button slot from the key state and axis readings.
fn read_button(
    source: ButtonSource,
    key_down: impl Fn(Key) -> bool,
    abs: impl Fn(AbsoluteAxisType) -> Option<AbsReading>,
) -> ButtonState {
    match source {
        ButtonSource::Key(key) => ButtonState::digital(key_down(key)),
        ButtonSource::Trigger(key, axis) => {
            let value = abs(axis).map_or(0.0, |r| (scale_axis(r.value, r.minimum, r.maximum) + 1.0) / 2.0);
            let held = key_down(key);
            ButtonState::new(held || value > TRIGGER_PRESS_THRESHOLD, if held { 1.0 } else { value })
        }
        ButtonSource::Hat(axis, direction) => {
            ButtonState::digital(abs(axis).is_some_and(|r| r.value.signum() == direction))
        }
    }
}

/// Device identifier: evdev name plus USB ids.
fn device_id(name: &str, vendor: u16, product: u16) -> String {
    format!("{} (Vendor: {:04x} Product: {:04x})", name, vendor, product)
}

struct OpenDevice {
    path: PathBuf,
    device: Device,
    buttons: Vec<ButtonSource>,
    axes: Vec<AbsoluteAxisType>,
}

impl OpenDevice {
    fn read(&self) -> std::io::Result<RawDeviceState> {
        let keys = self.device.get_key_state()?;
        let abs_state = self.device.get_abs_state()?;
        let abs = |axis: AbsoluteAxisType| {
            abs_state.get(usize::from(axis.0)).map(|info| AbsReading {
                value: info.value,
                minimum: info.minimum,
                maximum: info.maximum,
            })
        };

        let buttons = self
            .buttons
            .iter()
            .map(|source| read_button(*source, |key| keys.contains(key), abs))
            .collect();

        let axes = self
            .axes
            .iter()
            .map(|axis| abs(*axis).map_or(0.0, |r| scale_axis(r.value, r.minimum, r.maximum)))
            .collect();

        Ok(RawDeviceState { buttons, axes })
    }
}

/// Gamepads visible through evdev.
#[derive(Default)]
pub struct EvdevSource {
    open: BTreeMap<String, OpenDevice>,
}

impl EvdevSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn open_gamepad(path: PathBuf, device: Device) -> Option<(DeviceInfo, OpenDevice)> {
        let keys: Vec<Key> = device
            .supported_keys()
            .map(|set| set.iter().filter(|k| is_gamepad_key(*k)).collect())
            .unwrap_or_default();
        if keys.is_empty() {
            return None;
        }

        let standard = keys.contains(&Key::BTN_SOUTH);
        let abs: Vec<AbsoluteAxisType> = device
            .supported_absolute_axes()
            .map(|set| set.iter().collect())
            .unwrap_or_default();

        let name = device.name().unwrap_or("Unknown Gamepad").to_string();
        let input_id = device.input_id();
        let buttons = order_buttons(&keys, &abs, standard);
        let axes = order_axes(&abs, standard, uses_hat_dpad(&keys, &abs, standard));

        let info = DeviceInfo {
            id: device_id(&name, input_id.vendor(), input_id.product()),
            label: name,
            standard_layout: standard,
            button_count: buttons.len(),
            axis_count: axes.len(),
        };
        Some((
            info,
            OpenDevice {
                path,
                device,
                buttons,
                axes,
            },
        ))
    }
}

impl DeviceSource for EvdevSource {
    fn devices(&mut self) -> Vec<DeviceInfo> {
        let mut found: Vec<(PathBuf, Device)> = evdev::enumerate().collect();
        // Sort for deterministic ids when the same model is connected twice
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let mut open = BTreeMap::new();
        let mut roster = Vec::new();
        for (path, device) in found {
            let Some((info, handle)) = Self::open_gamepad(path, device) else {
                continue;
            };
            if open.contains_key(&info.id) {
                debug!("Skipping duplicate device {} at {}", info.id, handle.path.display());
                continue;
            }
            if !self.open.contains_key(&info.id) {
                info!("Found gamepad: {} at {}", info.id, handle.path.display());
            }
            open.insert(info.id.clone(), handle);
            roster.push(info);
        }

        self.open = open;
        roster
    }

    fn read(&mut self, id: &str) -> Option<RawDeviceState> {
        let handle = self.open.get(id)?;
        match handle.read() {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Failed to read {} at {}: {}", id, handle.path.display(), e);
                self.open.remove(id);
                None
            }
        }
    }
}
