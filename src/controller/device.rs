//! Trait abstraction for raw input devices to enable testing

/// Identity and shape of a visible input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Stable identifier, also the persistence key for its mapping table.
    pub id: String,
    /// Human-readable device name.
    pub label: String,
    /// Device reports the standard gamepad layout.
    pub standard_layout: bool,
    pub button_count: usize,
    pub axis_count: usize,
}

/// One button reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ButtonState {
    pub pressed: bool,
    /// Analog travel, 0.0 to 1.0 (digital buttons report 0.0 or 1.0).
    pub value: f32,
}

impl ButtonState {
    #[must_use]
    pub fn new(pressed: bool, value: f32) -> Self {
        Self { pressed, value }
    }

    /// Digital button helper.
    #[must_use]
    pub fn digital(pressed: bool) -> Self {
        Self {
            pressed,
            value: if pressed { 1.0 } else { 0.0 },
        }
    }
}

/// Raw readings of every button and axis of one device.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDeviceState {
    pub buttons: Vec<ButtonState>,
    /// Axis readings, nominally -1.0 to 1.0, indexed by axis index.
    pub axes: Vec<f32>,
}

/// Source of raw device input, refreshed on every call.
pub trait DeviceSource {
    /// Currently connected devices.
    fn devices(&mut self) -> Vec<DeviceInfo>;

    /// Current readings of device `id`, `None` if it is not connected.
    fn read(&mut self, id: &str) -> Option<RawDeviceState>;
}

impl<S: DeviceSource + ?Sized> DeviceSource for Box<S> {
    fn devices(&mut self) -> Vec<DeviceInfo> {
        (**self).devices()
    }

    fn read(&mut self, id: &str) -> Option<RawDeviceState> {
        (**self).read(id)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// Mock device source for testing
    ///
    /// Clones share state, so a test can keep a handle and change readings
    /// while the poller owns another clone.
    #[derive(Clone, Default)]
    pub struct MockDeviceSource {
        pub devices: Arc<Mutex<BTreeMap<String, (DeviceInfo, RawDeviceState)>>>,
        pub read_count: Arc<Mutex<usize>>,
    }

    impl MockDeviceSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Standard-layout pad with 17 buttons and 4 centered axes.
        pub fn with_gamepad(id: &str) -> Self {
            let source = Self::new();
            source.connect(gamepad_info(id, 17, 4));
            source
        }

        pub fn connect(&self, info: DeviceInfo) {
            let state = RawDeviceState {
                buttons: vec![ButtonState::default(); info.button_count],
                axes: vec![0.0; info.axis_count],
            };
            self.devices.lock().unwrap().insert(info.id.clone(), (info, state));
        }

        pub fn disconnect(&self, id: &str) {
            self.devices.lock().unwrap().remove(id);
        }

        pub fn set_axis(&self, id: &str, index: usize, value: f32) {
            if let Some((_, state)) = self.devices.lock().unwrap().get_mut(id) {
                state.axes[index] = value;
            }
        }

        pub fn set_button(&self, id: &str, index: usize, button: ButtonState) {
            if let Some((_, state)) = self.devices.lock().unwrap().get_mut(id) {
                state.buttons[index] = button;
            }
        }

        pub fn press(&self, id: &str, index: usize) {
            self.set_button(id, index, ButtonState::digital(true));
        }

        pub fn release(&self, id: &str, index: usize) {
            self.set_button(id, index, ButtonState::digital(false));
        }

        pub fn reads(&self) -> usize {
            *self.read_count.lock().unwrap()
        }
    }

    impl DeviceSource for MockDeviceSource {
        fn devices(&mut self) -> Vec<DeviceInfo> {
            self.devices
                .lock()
                .unwrap()
                .values()
                .map(|(info, _)| info.clone())
                .collect()
        }

        fn read(&mut self, id: &str) -> Option<RawDeviceState> {
            *self.read_count.lock().unwrap() += 1;
            self.devices.lock().unwrap().get(id).map(|(_, state)| state.clone())
        }
    }

    pub fn gamepad_info(id: &str, buttons: usize, axes: usize) -> DeviceInfo {
        DeviceInfo {
            id: id.to_string(),
            label: format!("{} pad", id),
            standard_layout: true,
            button_count: buttons,
            axis_count: axes,
        }
    }
}
