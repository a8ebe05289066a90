// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Macro toggle state.
//!
//! Macros are started with `on` and stopped with `off`. The same literal is
//! used as the trigger payload, as the retained echo from the hub, and in
//! the persisted state file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Known toggle state of a macro, also used as the trigger action.
///
/// The default is [`MacroState::On`], the action sent when a macro is
/// triggered without an explicit action.
///
/// # Examples
///
/// ```
/// use haptique_rs90::types::MacroState;
///
/// let state: MacroState = " ON ".parse().unwrap();
/// assert_eq!(state, MacroState::On);
/// assert_eq!(state.toggled(), MacroState::Off);
/// assert_eq!(MacroState::default().as_str(), "on");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacroState {
    /// The macro is running.
    #[default]
    On,
    /// The macro is stopped.
    Off,
}

impl MacroState {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    /// Returns the opposite state.
    #[must_use]
    pub const fn toggled(&self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }

    /// Returns `true` for [`MacroState::On`].
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }

    /// Computes the action a toggle control sends given the last known state.
    ///
    /// An unknown state is treated as off, so the first toggle starts the macro.
    #[must_use]
    pub fn toggle_from(last_known: Option<Self>) -> Self {
        last_known.unwrap_or(Self::Off).toggled()
    }
}

impl fmt::Display for MacroState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MacroState {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(ValueError::InvalidMacroState(s.to_string())),
        }
    }
}
