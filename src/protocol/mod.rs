// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Publish/subscribe transport used to talk to the hub.
//!
//! The coordinator treats the transport as an opaque capability: it can
//! subscribe to a topic and receive a stream of payloads, unsubscribe, and
//! publish a payload. Connection management, TLS and broker semantics are
//! the transport's business.
//!
//! # Implementations
//!
//! - [`MqttTransport`]: rumqttc-backed MQTT connection (feature `mqtt`)
//! - [`MemoryTransport`]: in-process loopback, for tests and simulations
//!
//! # Topics
//!
//! [`Topics`] builds every topic under `<base>/<remote_id>/` and [`Route`]
//! names the handler each subscribed topic feeds.

mod memory;
#[cfg(feature = "mqtt")]
mod mqtt_transport;
mod topics;

pub use memory::{MemoryTransport, Published};
#[cfg(feature = "mqtt")]
pub use mqtt_transport::{MqttTransport, MqttTransportBuilder, MqttTransportConfig};
pub use topics::{Route, Topics};

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::ProtocolError;

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Qos {
    /// Fire and forget.
    AtMostOnce,
    /// Delivered at least once; duplicates possible.
    #[default]
    AtLeastOnce,
    /// Delivered exactly once.
    ExactlyOnce,
}

/// Trait for publish/subscribe transports that can reach the hub.
///
/// All futures are `Send` so the coordinator can drive them from spawned
/// background tasks.
pub trait Transport: Send + Sync + 'static {
    /// Subscribes to a topic and returns a stream of its payloads.
    ///
    /// Payloads are delivered as UTF-8 strings; an empty string is a valid
    /// payload. The stream ends when the topic is unsubscribed or the
    /// transport shuts down.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the subscription cannot be established.
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<String>, ProtocolError>> + Send;

    /// Unsubscribes from a topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the transport rejects the request.
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Publishes a payload.
    ///
    /// Completion means the transport accepted the message for delivery, not
    /// that anyone received it.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the transport rejects the message.
    fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: Qos,
        retain: bool,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}
