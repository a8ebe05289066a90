// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operator-facing dump of the coordinator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Device, Macro, RemoteStatus};

/// Counts and raw lists for operator inspection.
///
/// Serializes to JSON for support dumps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub remote_id: String,
    pub status: RemoteStatus,
    pub devices_count: usize,
    pub devices: Vec<Device>,
    pub macros_count: usize,
    pub macros: Vec<Macro>,
    /// Cached catalog size per device.
    pub device_commands: BTreeMap<String, usize>,
    /// Live transport subscriptions, fixed topics included.
    pub subscriptions_count: usize,
    pub subscribed_devices: Vec<String>,
    pub subscribed_macros: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
}
