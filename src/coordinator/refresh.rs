// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic status requests.
//!
//! The hub answers some topics only when asked. Each tick publishes an
//! empty request to `battery/status` and to both catalog topics of every
//! subscribed device. Publishes are independent: a failure is logged and
//! the rest of the fan-out continues. Whether the hub answers is not
//! tracked; an unanswered request leaves the previous value in place.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::{Qos, Topics, Transport};
use crate::state::RemoteState;

/// Outcome of one refresh tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    /// Snapshot at the time the tick completed.
    pub snapshot: RemoteState,
    /// Requests the transport accepted.
    pub requests_sent: usize,
    /// Requests the transport rejected.
    pub requests_failed: usize,
    /// When the tick completed.
    pub at: DateTime<Utc>,
}

/// Counts of one request fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FanOut {
    pub sent: usize,
    pub failed: usize,
}

impl FanOut {
    fn record(&mut self, topic: &str, result: Result<(), crate::error::ProtocolError>) {
        match result {
            Ok(()) => self.sent += 1,
            Err(e) => {
                self.failed += 1;
                tracing::error!(topic = %topic, error = %e, "Refresh request failed");
            }
        }
    }
}

/// Publishes the battery request alone, as done once at startup.
pub(crate) async fn request_battery<T: Transport>(transport: &T, topics: &Topics) -> FanOut {
    let mut fan_out = FanOut::default();
    let topic = topics.battery_request();
    fan_out.record(
        &topic,
        transport.publish(&topic, "", Qos::AtLeastOnce, false).await,
    );
    fan_out
}

/// Publishes every request of one tick.
pub(crate) async fn send_requests<T: Transport>(
    transport: &T,
    topics: &Topics,
    devices: &[String],
) -> FanOut {
    let mut fan_out = request_battery(transport, topics).await;

    for device in devices {
        for topic in topics.device_catalog_topics(device) {
            fan_out.record(
                &topic,
                transport.publish(&topic, "", Qos::AtLeastOnce, false).await,
            );
        }
    }

    tracing::debug!(
        sent = fan_out.sent,
        failed = fan_out.failed,
        devices = devices.len(),
        "Refresh requests published"
    );
    fan_out
}
