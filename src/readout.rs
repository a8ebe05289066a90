// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Display values derived from a snapshot.
//!
//! Everything here is a pure function of a [`RemoteState`]; nothing is
//! cached, so every consumer recomputes the same answer from the same
//! snapshot.
//!
//! # Examples
//!
//! ```
//! use haptique_rs90::readout::{Readout, ReadoutValue, battery_icon};
//! use haptique_rs90::state::{RemoteState, StateChange};
//! use haptique_rs90::types::{BatteryLevel, MacroState};
//!
//! let mut state = RemoteState::new();
//! state.apply(&StateChange::Battery(BatteryLevel::clamped(42)));
//! state.apply(&StateChange::macro_state("Watch TV", MacroState::On));
//!
//! assert_eq!(battery_icon(state.battery_level), "mdi:battery-50");
//! assert_eq!(
//!     Readout::RunningMacro.value(&state),
//!     ReadoutValue::Text(Some("Watch TV".to_string()))
//! );
//! assert_eq!(Readout::Battery.key("rs90-01"), "rs90-01_battery");
//! ```

use serde::Serialize;

use crate::state::RemoteState;
use crate::types::{BatteryLevel, MacroState, RemoteStatus};

/// Value shown when no macro is on.
pub const IDLE: &str = "Idle";

/// Returns the icon for a battery level, by ceiling decile.
#[must_use]
pub fn battery_icon(level: Option<BatteryLevel>) -> &'static str {
    const DECILES: [&str; 9] = [
        "mdi:battery-10",
        "mdi:battery-20",
        "mdi:battery-30",
        "mdi:battery-40",
        "mdi:battery-50",
        "mdi:battery-60",
        "mdi:battery-70",
        "mdi:battery-80",
        "mdi:battery-90",
    ];

    let Some(level) = level else {
        return "mdi:battery-unknown";
    };
    let decile = usize::from(level.value().saturating_sub(1) / 10);
    DECILES.get(decile).copied().unwrap_or("mdi:battery")
}

/// Returns `Button <n>` for the last key pressed.
#[must_use]
pub fn last_key_label(state: &RemoteState) -> Option<String> {
    state.last_key.as_ref().map(|key| format!("Button {key}"))
}

/// Returns the first macro (in name order) whose state is on, or [`IDLE`].
#[must_use]
pub fn running_macro(state: &RemoteState) -> &str {
    state
        .macro_states
        .iter()
        .find(|(_, s)| s.is_on())
        .map_or(IDLE, |(name, _)| name.as_str())
}

/// Returns every macro whose state is on, in name order.
#[must_use]
pub fn active_macros(state: &RemoteState) -> Vec<&str> {
    state
        .macro_states
        .iter()
        .filter(|(_, s)| s.is_on())
        .map(|(name, _)| name.as_str())
        .collect()
}

/// Returns `true` if the hub reported itself online.
#[must_use]
pub fn is_available(state: &RemoteState) -> bool {
    state.status == RemoteStatus::Online
}

/// Turns a name into a key fragment: lowercase, with space, `-`, `/`, `+`
/// and `#` replaced by `_`.
#[must_use]
pub fn sanitize_key(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '/' | '+' | '#' => '_',
            c => c,
        })
        .collect()
}

/// A displayable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReadoutValue {
    /// A percentage, unset until reported.
    Percent(Option<u8>),
    /// Free text, unset until reported.
    Text(Option<String>),
    /// A number of items.
    Count(usize),
    /// An on/off switch.
    Switch(bool),
}

/// One displayable readout of a hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Readout {
    /// Battery percentage.
    Battery,
    /// Last button pressed.
    LastKey,
    /// First macro that is on.
    RunningMacro,
    /// Number of listed devices.
    DeviceList,
    /// Catalog size of one device.
    DeviceCommands(String),
    /// Toggle state of one macro.
    Macro(String),
}

impl Readout {
    /// Every readout a snapshot currently supports: the fixed ones, one per
    /// device with a name and one per macro with a name.
    #[must_use]
    pub fn all(state: &RemoteState) -> Vec<Self> {
        let mut readouts = vec![
            Self::Battery,
            Self::LastKey,
            Self::RunningMacro,
            Self::DeviceList,
        ];
        readouts.extend(
            state
                .device_names()
                .into_iter()
                .map(|d| Self::DeviceCommands(d.to_string())),
        );
        readouts.extend(
            state
                .macro_names()
                .into_iter()
                .map(|m| Self::Macro(m.to_string())),
        );
        readouts
    }

    /// Returns a key unique per hub.
    #[must_use]
    pub fn key(&self, remote_id: &str) -> String {
        match self {
            Self::Battery => format!("{remote_id}_battery"),
            Self::LastKey => format!("{remote_id}_last_key"),
            Self::RunningMacro => format!("{remote_id}_running_macro"),
            Self::DeviceList => format!("{remote_id}_device_list"),
            Self::DeviceCommands(device) => {
                format!("{remote_id}_commands_{}", sanitize_key(device))
            }
            Self::Macro(name) => format!("{remote_id}_macro_{}", sanitize_key(name)),
        }
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Battery => "Battery".to_string(),
            Self::LastKey => "Last Key Pressed".to_string(),
            Self::RunningMacro => "Running Macro".to_string(),
            Self::DeviceList => "Device List".to_string(),
            Self::DeviceCommands(device) => format!("{device} Commands"),
            Self::Macro(name) => format!("Macro: {name}"),
        }
    }

    /// Returns the icon for the current snapshot.
    #[must_use]
    pub fn icon(&self, state: &RemoteState) -> &'static str {
        match self {
            Self::Battery => battery_icon(state.battery_level),
            Self::LastKey => "mdi:gesture-tap-button",
            Self::RunningMacro if running_macro(state) == IDLE => "mdi:stop-circle",
            Self::RunningMacro => "mdi:play-circle",
            Self::DeviceList => "mdi:devices",
            Self::DeviceCommands(_) => "mdi:remote",
            Self::Macro(name) if state.macro_state(name).is_some_and(|s| s.is_on()) => {
                "mdi:stop-circle"
            }
            Self::Macro(_) => "mdi:play-circle",
        }
    }

    /// Returns the value for the current snapshot.
    #[must_use]
    pub fn value(&self, state: &RemoteState) -> ReadoutValue {
        match self {
            Self::Battery => ReadoutValue::Percent(state.battery_level.map(|b| b.value())),
            Self::LastKey => ReadoutValue::Text(last_key_label(state)),
            Self::RunningMacro => ReadoutValue::Text(Some(running_macro(state).to_string())),
            Self::DeviceList => ReadoutValue::Count(state.devices.len()),
            Self::DeviceCommands(device) => ReadoutValue::Count(state.commands_for(device).len()),
            Self::Macro(name) => {
                ReadoutValue::Switch(state.macro_state(name).is_some_and(|s| s.is_on()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateChange;
    use crate::types::Entity;

    #[test]
    fn battery_icon_deciles() {
        assert_eq!(battery_icon(None), "mdi:battery-unknown");
        assert_eq!(battery_icon(Some(BatteryLevel::EMPTY)), "mdi:battery-10");
        assert_eq!(battery_icon(Some(BatteryLevel::clamped(10))), "mdi:battery-10");
        assert_eq!(battery_icon(Some(BatteryLevel::clamped(11))), "mdi:battery-20");
        assert_eq!(battery_icon(Some(BatteryLevel::clamped(90))), "mdi:battery-90");
        assert_eq!(battery_icon(Some(BatteryLevel::clamped(91))), "mdi:battery");
        assert_eq!(battery_icon(Some(BatteryLevel::FULL)), "mdi:battery");
    }

    #[test]
    fn running_macro_prefers_first_on() {
        let mut state = RemoteState::new();
        assert_eq!(running_macro(&state), IDLE);

        state.apply(&StateChange::macro_state("b", MacroState::On));
        state.apply(&StateChange::macro_state("a", MacroState::Off));
        state.apply(&StateChange::macro_state("c", MacroState::On));
        assert_eq!(running_macro(&state), "b");
        assert_eq!(active_macros(&state), vec!["b", "c"]);
        assert_eq!(Readout::RunningMacro.icon(&state), "mdi:play-circle");
    }

    #[test]
    fn last_key_label_format() {
        let mut state = RemoteState::new();
        assert!(last_key_label(&state).is_none());
        state.apply(&StateChange::LastKey("7".to_string()));
        assert_eq!(last_key_label(&state).as_deref(), Some("Button 7"));
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_key("Living Room-TV/2+#"), "living_room_tv_2__");
    }

    #[test]
    fn readout_keys_and_names() {
        let readout = Readout::DeviceCommands("Pioneer AVR".to_string());
        assert_eq!(readout.key("rs90"), "rs90_commands_pioneer_avr");
        assert_eq!(readout.name(), "Pioneer AVR Commands");
        assert_eq!(Readout::Macro("Watch TV".to_string()).name(), "Macro: Watch TV");
    }

    #[test]
    fn macro_readout_follows_state() {
        let mut state = RemoteState::new();
        let readout = Readout::Macro("X".to_string());
        assert_eq!(readout.value(&state), ReadoutValue::Switch(false));
        assert_eq!(readout.icon(&state), "mdi:play-circle");

        state.apply(&StateChange::macro_state("X", MacroState::On));
        assert_eq!(readout.value(&state), ReadoutValue::Switch(true));
        assert_eq!(readout.icon(&state), "mdi:stop-circle");
    }

    #[test]
    fn all_lists_named_entities() {
        let mut state = RemoteState::new();
        state.apply(&StateChange::Devices(vec![Entity::new("1", "TV")]));
        state.apply(&StateChange::Macros(vec![
            Entity::new("1", "Watch TV"),
            Entity {
                id: Some("2".to_string()),
                name: None,
            },
        ]));

        let all = Readout::all(&state);
        assert_eq!(all.len(), 6);
        assert!(all.contains(&Readout::DeviceCommands("TV".to_string())));
        assert!(all.contains(&Readout::Macro("Watch TV".to_string())));
        assert_eq!(Readout::DeviceList.value(&state), ReadoutValue::Count(1));
    }

    #[test]
    fn availability() {
        let mut state = RemoteState::new();
        assert!(!is_available(&state));
        state.apply(&StateChange::Status(RemoteStatus::Online));
        assert!(is_available(&state));
    }
}
