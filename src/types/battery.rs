// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Battery level type.
//!
//! The hub reports its battery charge as a percentage. This module provides a
//! type-safe representation that is always within 0-100%.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Battery charge as a percentage (0-100).
///
/// # Examples
///
/// ```
/// use haptique_rs90::types::BatteryLevel;
///
/// let level = BatteryLevel::new(85).unwrap();
/// assert_eq!(level.value(), 85);
///
/// // Out-of-range readings are clamped
/// assert_eq!(BatteryLevel::clamped(150).value(), 100);
///
/// // Invalid values return error
/// assert!(BatteryLevel::new(101).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BatteryLevel(u8);

impl BatteryLevel {
    /// Empty battery (0%).
    pub const EMPTY: Self = Self(0);

    /// Full battery (100%).
    pub const FULL: Self = Self(100);

    /// Creates a new battery level.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value exceeds 100.
    pub fn new(value: u8) -> Result<Self, ValueError> {
        if value > 100 {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: 100,
                actual: u16::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Creates a battery level, clamping to the valid range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn clamped(value: u64) -> Self {
        if value > 100 {
            Self(100)
        } else {
            // Fits: value <= 100
            Self(value as u8)
        }
    }

    /// Returns the percentage value.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<u8> for BatteryLevel {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BatteryLevel> for u8 {
    fn from(level: BatteryLevel) -> Self {
        level.0
    }
}
