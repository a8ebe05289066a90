// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `haptique_rs90` - A Rust library bridging Haptique RS90 remote hubs to
//! home automation over MQTT.
//!
//! The hub publishes its status, battery level, key presses, device list,
//! macro list and per-device command catalogs on MQTT topics under
//! `<base>/<remote_id>/`. This library keeps one consistent in-memory view
//! of all of it and lets callers trigger macros and device commands.
//!
//! # Supported Features
//!
//! - **Discovery**: Devices and macros are subscribed as they appear in the
//!   hub's lists and detached when they disappear
//! - **State**: A single snapshot per hub, published on every change
//! - **Macros**: On/off/toggle triggers, with toggle states persisted across
//!   restarts
//! - **Refresh**: Periodic battery and catalog re-requests
//! - **Readouts**: Display values (icons, labels, counts) derived from a
//!   snapshot
//!
//! # Quick Start
//!
//! ```no_run
//! use haptique_rs90::{Coordinator, CoordinatorConfig, MacroState};
//! use haptique_rs90::protocol::MqttTransport;
//!
//! #[tokio::main]
//! async fn main() -> haptique_rs90::Result<()> {
//!     let transport = MqttTransport::builder()
//!         .host("192.168.1.50")
//!         .credentials("user", "pass")
//!         .build()
//!         .await?;
//!
//!     let coordinator =
//!         Coordinator::start(transport, CoordinatorConfig::new("rs90-01")).await?;
//!
//!     coordinator.trigger_macro("Watch TV", MacroState::On).await?;
//!     coordinator.shutdown().await
//! }
//! ```
//!
//! ## Listening for Changes
//!
//! ```no_run
//! use haptique_rs90::{Coordinator, CoordinatorConfig};
//! use haptique_rs90::protocol::MemoryTransport;
//!
//! #[tokio::main]
//! async fn main() -> haptique_rs90::Result<()> {
//!     let coordinator =
//!         Coordinator::start(MemoryTransport::new(), CoordinatorConfig::new("rs90-01")).await?;
//!
//!     coordinator.on_macro_state(|name, state| {
//!         println!("{name} is now {state:?}");
//!     });
//!
//!     let mut updates = coordinator.watch();
//!     while updates.changed().await.is_ok() {
//!         println!("battery: {:?}", updates.borrow().battery_level);
//!     }
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod readout;
pub mod state;
pub mod subscription;
pub mod telemetry;
pub mod types;

pub use coordinator::{Coordinator, CoordinatorConfig, Diagnostics, RefreshReport};
pub use error::{Error, ParseError, PersistenceError, ProtocolError, Result, ValueError};
pub use persistence::{MacroStates, MacroStore};
pub use protocol::{MemoryTransport, Qos, Route, Topics, Transport};
#[cfg(feature = "mqtt")]
pub use protocol::{MqttTransport, MqttTransportBuilder, MqttTransportConfig};
pub use readout::{Readout, ReadoutValue};
pub use state::{RemoteState, StateChange};
pub use subscription::{ListenerId, ListenerRegistry};
pub use types::{
    BatteryLevel, Device, DeviceCommand, Entity, EntityKind, Macro, MacroState, RemoteStatus,
};
