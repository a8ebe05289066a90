// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State change representation.
//!
//! Every mutation of [`RemoteState`](super::RemoteState) is expressed as a
//! [`StateChange`]. Inbound payloads are parsed into changes, the dispatcher
//! produces changes for optimistic writes, and listeners receive the change
//! that was applied alongside the new snapshot.
//!
//! # Examples
//!
//! ```
//! use haptique_rs90::state::{RemoteState, StateChange};
//! use haptique_rs90::types::MacroState;
//!
//! let mut state = RemoteState::new();
//!
//! // Apply returns true if state actually changed
//! let change = StateChange::macro_state("Watch TV", MacroState::On);
//! assert!(state.apply(&change));
//!
//! // Applying the same change again returns false
//! assert!(!state.apply(&change));
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{BatteryLevel, Device, DeviceCommand, Macro, MacroState, RemoteStatus};

/// Represents a change in hub state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateChange {
    /// The hub's connectivity status changed.
    Status(RemoteStatus),

    /// A new battery reading arrived.
    Battery(BatteryLevel),

    /// A key was pressed on the remote.
    LastKey(String),

    /// The raw test status changed.
    ///
    /// A non-empty payload names the running macro or test; an empty one
    /// means idle.
    TestStatus(String),

    /// The device list was replaced.
    Devices(Vec<Device>),

    /// The macro list was replaced.
    Macros(Vec<Macro>),

    /// A device's command catalog was replaced.
    DeviceCommands {
        /// The owning device name.
        device: String,
        /// The normalized catalog.
        commands: Vec<DeviceCommand>,
    },

    /// A device's cached command catalog was purged.
    DeviceCommandsRemoved {
        /// The device that left the device list.
        device: String,
    },

    /// A macro's toggle state was observed or written.
    MacroState {
        /// The macro name.
        name: String,
        /// The new state.
        state: MacroState,
    },

    /// A macro's toggle state was purged.
    MacroStateRemoved {
        /// The macro that left the macro list.
        name: String,
    },
}

impl StateChange {
    /// Creates a macro state change.
    #[must_use]
    pub fn macro_state(name: impl Into<String>, state: MacroState) -> Self {
        Self::MacroState {
            name: name.into(),
            state,
        }
    }

    /// Creates a command catalog change.
    #[must_use]
    pub fn device_commands(device: impl Into<String>, commands: Vec<DeviceCommand>) -> Self {
        Self::DeviceCommands {
            device: device.into(),
            commands,
        }
    }

    /// Returns `true` if applying this change must be followed by a save of
    /// the persisted macro states.
    #[must_use]
    pub fn touches_macro_states(&self) -> bool {
        matches!(self, Self::MacroState { .. } | Self::MacroStateRemoved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touches_macro_states() {
        assert!(StateChange::macro_state("X", MacroState::On).touches_macro_states());
        assert!(
            StateChange::MacroStateRemoved {
                name: "X".to_string()
            }
            .touches_macro_states()
        );
        assert!(!StateChange::Status(RemoteStatus::Online).touches_macro_states());
        assert!(!StateChange::device_commands("TV", vec![]).touches_macro_states());
    }
}
