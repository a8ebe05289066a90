// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscriptions in both directions.
//!
//! - [`SubscriptionManager`] - Live transport subscriptions, one per topic,
//!   forwarding payloads into the coordinator as [`InboundMessage`]s
//! - [`ListenerRegistry`] - Consumers registered for applied state changes,
//!   identified by [`ListenerId`]
//!
//! # Usage
//!
//! Listeners are normally registered through the coordinator handle:
//!
//! ```no_run
//! use haptique_rs90::coordinator::{Coordinator, CoordinatorConfig};
//! use haptique_rs90::protocol::MemoryTransport;
//!
//! # async fn example() -> haptique_rs90::Result<()> {
//! let coordinator = Coordinator::start(
//!     MemoryTransport::new(),
//!     CoordinatorConfig::new("rs90-01"),
//! )
//! .await?;
//!
//! let id = coordinator.on_change(|change, snapshot| {
//!     println!("{change:?} -> battery {:?}", snapshot.battery_level);
//! });
//!
//! // Later
//! coordinator.remove_listener(id);
//! # Ok(())
//! # }
//! ```

mod listener;
mod manager;

pub use listener::{ListenerId, ListenerRegistry};
pub use manager::{InboundMessage, SubscriptionManager};
