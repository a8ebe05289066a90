// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for hub state.
//!
//! These types provide validated representations of the values the hub
//! reports or accepts.

mod battery;
mod entity;
mod macro_state;
mod status;

pub use battery::BatteryLevel;
pub use entity::{Device, DeviceCommand, Entity, EntityKind, Macro};
pub use macro_state::MacroState;
pub use status::RemoteStatus;
