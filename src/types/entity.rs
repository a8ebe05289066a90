// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Records published by the hub in its device, macro and command lists.

use serde::{Deserialize, Serialize};

/// A named record from one of the hub's lists.
///
/// The `name` is the stable join key used for topics and state maps. The
/// `id` is kept for diagnostics only; the hub is inconsistent about it
/// (duplicates, `id` vs `Id`), so nothing keys on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Entity {
    /// Normalized identifier, rendered as a string.
    pub id: Option<String>,
    /// Display name; records without one are listed but never subscribed.
    pub name: Option<String>,
}

impl Entity {
    /// Creates a record with both fields set.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
        }
    }

    /// Returns the name if present and non-empty.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// A downstream appliance controlled by the hub.
pub type Device = Entity;

/// A named automation routine on the hub.
pub type Macro = Entity;

/// One entry of a device's command catalog.
pub type DeviceCommand = Entity;

/// The two kinds of list the hub publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Records from the `devices` topic.
    Device,
    /// Records from the `macros` topic.
    Macro,
}

impl EntityKind {
    /// Returns a lowercase label for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Macro => "macro",
        }
    }
}
