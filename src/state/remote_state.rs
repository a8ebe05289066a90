// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Aggregated hub state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{BatteryLevel, Device, DeviceCommand, Macro, MacroState, RemoteStatus};

use super::StateChange;

/// Everything the coordinator knows about one hub.
///
/// The coordinator owns exactly one instance and mutates it only through
/// [`RemoteState::apply`]. Consumers receive clones of it as snapshots.
/// All values are optional or empty until the hub reports them.
///
/// # Examples
///
/// ```
/// use haptique_rs90::state::{RemoteState, StateChange};
/// use haptique_rs90::types::{BatteryLevel, RemoteStatus};
///
/// let mut state = RemoteState::new();
/// assert_eq!(state.status, RemoteStatus::Offline);
///
/// state.apply(&StateChange::Battery(BatteryLevel::clamped(85)));
/// assert_eq!(state.battery_level.map(|b| b.value()), Some(85));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    /// Connectivity reported on the `status` topic.
    pub status: RemoteStatus,
    /// Last battery reading, unset until the hub answers a request.
    pub battery_level: Option<BatteryLevel>,
    /// Number of the last button pressed.
    pub last_key: Option<String>,
    /// Description of the running macro or test, if any.
    pub running_macro: Option<String>,
    /// Raw payload of the last `test_status` message.
    pub test_status: Option<String>,
    /// Devices from the most recent device list.
    pub devices: Vec<Device>,
    /// Macros from the most recent macro list.
    pub macros: Vec<Macro>,
    /// Command catalogs keyed by device name.
    pub device_commands: BTreeMap<String, Vec<DeviceCommand>>,
    /// Toggle states keyed by macro name.
    pub macro_states: BTreeMap<String, MacroState>,
}

impl RemoteState {
    /// Creates a new state with startup defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new state seeded with persisted macro states.
    #[must_use]
    pub fn with_macro_states(macro_states: BTreeMap<String, MacroState>) -> Self {
        Self {
            macro_states,
            ..Self::default()
        }
    }

    /// Applies a change and reports whether anything was modified.
    pub fn apply(&mut self, change: &StateChange) -> bool {
        match change {
            StateChange::Status(status) => replace(&mut self.status, *status),
            StateChange::Battery(level) => replace(&mut self.battery_level, Some(*level)),
            StateChange::LastKey(key) => replace(&mut self.last_key, Some(key.clone())),
            StateChange::TestStatus(raw) => {
                let running = (!raw.is_empty()).then(|| raw.clone());
                let test_changed = replace(&mut self.test_status, Some(raw.clone()));
                let running_changed = replace(&mut self.running_macro, running);
                test_changed || running_changed
            }
            StateChange::Devices(devices) => replace(&mut self.devices, devices.clone()),
            StateChange::Macros(macros) => replace(&mut self.macros, macros.clone()),
            StateChange::DeviceCommands { device, commands } => {
                if self.device_commands.get(device) == Some(commands) {
                    return false;
                }
                self.device_commands.insert(device.clone(), commands.clone());
                true
            }
            StateChange::DeviceCommandsRemoved { device } => {
                self.device_commands.remove(device).is_some()
            }
            StateChange::MacroState { name, state } => {
                self.macro_states.insert(name.clone(), *state) != Some(*state)
            }
            StateChange::MacroStateRemoved { name } => self.macro_states.remove(name).is_some(),
        }
    }

    /// Returns the last known state of a macro.
    #[must_use]
    pub fn macro_state(&self, name: &str) -> Option<MacroState> {
        self.macro_states.get(name).copied()
    }

    /// Returns the cached command catalog of a device.
    #[must_use]
    pub fn commands_for(&self, device: &str) -> &[DeviceCommand] {
        self.device_commands
            .get(device)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the names of listed devices, skipping unnamed records.
    #[must_use]
    pub fn device_names(&self) -> Vec<&str> {
        self.devices.iter().filter_map(Device::name).collect()
    }

    /// Returns the names of listed macros, skipping unnamed records.
    #[must_use]
    pub fn macro_names(&self) -> Vec<&str> {
        self.macros.iter().filter_map(Macro::name).collect()
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
