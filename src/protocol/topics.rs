// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic namespace of one hub.
//!
//! All topics live under `<base>/<remote_id>/`:
//!
//! ```text
//! status                   subscribe   online / offline
//! devices                  subscribe   JSON list of devices
//! macros                   subscribe   JSON list of macros
//! battery/status           publish     empty request for a battery reading
//! battery_level            subscribe   battery percentage
//! keys                     subscribe   button:<n>
//! test_status              subscribe   running macro description
//! device/<name>/commands   both        JSON command catalog
//! device/<name>/detail     both        JSON command catalog (older firmware)
//! device/<name>/trigger    publish     command name
//! macro/<name>/trigger     both        on / off, retained
//! ```

use std::fmt;

/// Builds the topics of one hub.
///
/// # Examples
///
/// ```
/// use haptique_rs90::protocol::Topics;
///
/// let topics = Topics::new("haptique", "rs90-01");
/// assert_eq!(topics.status(), "haptique/rs90-01/status");
/// assert_eq!(topics.macro_trigger("Watch TV"), "haptique/rs90-01/macro/Watch TV/trigger");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    root: String,
}

impl Topics {
    /// Creates the namespace for a hub.
    #[must_use]
    pub fn new(base: &str, remote_id: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            root: format!("{base}/{remote_id}"),
        }
    }

    /// Returns the `<base>/<remote_id>` prefix.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    fn suffix(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.root)
    }

    /// Hub connectivity topic.
    #[must_use]
    pub fn status(&self) -> String {
        self.suffix("status")
    }

    /// Device list topic.
    #[must_use]
    pub fn devices(&self) -> String {
        self.suffix("devices")
    }

    /// Macro list topic.
    #[must_use]
    pub fn macros(&self) -> String {
        self.suffix("macros")
    }

    /// Topic that makes the hub publish its battery level.
    #[must_use]
    pub fn battery_request(&self) -> String {
        self.suffix("battery/status")
    }

    /// Battery level topic.
    #[must_use]
    pub fn battery_level(&self) -> String {
        self.suffix("battery_level")
    }

    /// Key press topic.
    #[must_use]
    pub fn keys(&self) -> String {
        self.suffix("keys")
    }

    /// Running macro / test topic.
    #[must_use]
    pub fn test_status(&self) -> String {
        self.suffix("test_status")
    }

    /// Command catalog topic of a device.
    #[must_use]
    pub fn device_commands(&self, device: &str) -> String {
        format!("{}/device/{device}/commands", self.root)
    }

    /// Legacy command catalog topic of a device.
    #[must_use]
    pub fn device_detail(&self, device: &str) -> String {
        format!("{}/device/{device}/detail", self.root)
    }

    /// Both command catalog topics of a device.
    ///
    /// Firmware generations disagree on which one is used, so both are
    /// subscribed and polled.
    #[must_use]
    pub fn device_catalog_topics(&self, device: &str) -> [String; 2] {
        [self.device_commands(device), self.device_detail(device)]
    }

    /// Command execution topic of a device.
    #[must_use]
    pub fn device_trigger(&self, device: &str) -> String {
        format!("{}/device/{device}/trigger", self.root)
    }

    /// Trigger topic of a macro.
    #[must_use]
    pub fn macro_trigger(&self, name: &str) -> String {
        format!("{}/macro/{name}/trigger", self.root)
    }

    /// Fixed topics subscribed for the lifetime of the coordinator.
    #[must_use]
    pub fn fixed_subscriptions(&self) -> Vec<(String, Route)> {
        vec![
            (self.status(), Route::Status),
            (self.devices(), Route::DeviceList),
            (self.macros(), Route::MacroList),
            (self.battery_level(), Route::BatteryLevel),
            (self.keys(), Route::Keys),
            (self.test_status(), Route::TestStatus),
        ]
    }
}

/// The handler a subscribed topic feeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// `status`
    Status,
    /// `devices`
    DeviceList,
    /// `macros`
    MacroList,
    /// `battery_level`
    BatteryLevel,
    /// `keys`
    Keys,
    /// `test_status`
    TestStatus,
    /// `device/<name>/commands` or `device/<name>/detail`
    DeviceDetail(String),
    /// `macro/<name>/trigger`
    MacroTrigger(String),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => f.write_str("status"),
            Self::DeviceList => f.write_str("devices"),
            Self::MacroList => f.write_str("macros"),
            Self::BatteryLevel => f.write_str("battery_level"),
            Self::Keys => f.write_str("keys"),
            Self::TestStatus => f.write_str("test_status"),
            Self::DeviceDetail(name) => write!(f, "device/{name}"),
            Self::MacroTrigger(name) => write!(f, "macro/{name}"),
        }
    }
}
