// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsers for the hub's plain-text status topics.
//!
//! The hub publishes several loosely formatted values:
//!
//! - `status` - `online` / `offline`
//! - `battery_level` - a percentage, sometimes with `%` or surrounding text
//! - `keys` - `button:<n>` on each key press
//! - `test_status` - free text naming the running macro, empty when idle
//! - `macro/<name>/trigger` - `on` / `off`
//!
//! Each parser turns a payload into a [`StateChange`] or a [`ParseError`];
//! callers log the error and keep the previous state.
//!
//! # Examples
//!
//! ```
//! use haptique_rs90::state::StateChange;
//! use haptique_rs90::telemetry::parse_battery;
//!
//! let change = parse_battery("level=92").unwrap();
//! assert!(matches!(change, StateChange::Battery(level) if level.value() == 92));
//! ```

use crate::error::ParseError;
use crate::state::StateChange;
use crate::types::{BatteryLevel, MacroState, RemoteStatus};

/// Marker preceding the button number in key events.
const KEY_MARKER: &str = "button:";

/// Parses a `status` payload.
///
/// Never fails: unrecognized text maps to [`RemoteStatus::Unknown`].
#[must_use]
pub fn parse_status(payload: &str) -> StateChange {
    StateChange::Status(RemoteStatus::from_payload(payload))
}

/// Parses a `battery_level` payload.
///
/// Accepts `85`, `85%`, `85 %` and free text such as `level=85`. A payload
/// containing `%` must be digits once every `%` is removed; any other payload
/// uses its first run of digits. The value is clamped to 0-100.
///
/// # Errors
///
/// Returns `ParseError::InvalidValue` if no usable digits are found.
pub fn parse_battery(payload: &str) -> Result<StateChange, ParseError> {
    let trimmed = payload.trim();
    let digits = if trimmed.contains('%') {
        let stripped = trimmed.replace('%', "");
        let stripped = stripped.trim();
        if stripped.is_empty() || !stripped.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid_battery(trimmed, "percentage is not a plain number"));
        }
        stripped.to_string()
    } else {
        trimmed
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(char::is_ascii_digit)
            .collect()
    };

    if digits.is_empty() {
        return Err(invalid_battery(trimmed, "no digits"));
    }

    // Runs too long for u64 are far above 100 anyway
    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    Ok(StateChange::Battery(BatteryLevel::clamped(value)))
}

fn invalid_battery(payload: &str, reason: &str) -> ParseError {
    ParseError::InvalidValue {
        field: "battery_level".to_string(),
        message: format!("{reason} in {payload:?}"),
    }
}

/// Parses a `keys` payload of the form `button:<n>`.
///
/// # Errors
///
/// Returns `ParseError::UnexpectedFormat` if the marker is missing or no
/// button number follows it.
pub fn parse_key(payload: &str) -> Result<StateChange, ParseError> {
    let Some((_, button)) = payload.split_once(KEY_MARKER) else {
        return Err(ParseError::UnexpectedFormat(format!(
            "key payload without {KEY_MARKER:?}: {payload:?}"
        )));
    };

    let button = button.trim();
    if button.is_empty() {
        return Err(ParseError::UnexpectedFormat(format!(
            "key payload without button number: {payload:?}"
        )));
    }

    Ok(StateChange::LastKey(button.to_string()))
}

/// Parses a `test_status` payload.
///
/// Never fails: any text is a description of the running macro, and an
/// empty payload means idle.
#[must_use]
pub fn parse_test_status(payload: &str) -> StateChange {
    StateChange::TestStatus(payload.to_string())
}

/// Parses a `macro/<name>/trigger` payload for the given macro.
///
/// # Errors
///
/// Returns `ParseError::InvalidValue` for anything other than `on`/`off`,
/// including the empty payload.
pub fn parse_macro_trigger(name: &str, payload: &str) -> Result<StateChange, ParseError> {
    let state = payload
        .parse::<MacroState>()
        .map_err(|e| ParseError::InvalidValue {
            field: format!("macro/{name}/trigger"),
            message: e.to_string(),
        })?;
    Ok(StateChange::macro_state(name, state))
}
