// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT transport backed by `rumqttc`.
//!
//! One [`MqttTransport`] owns one broker connection. Incoming publishes are
//! routed by exact topic to every receiver returned from
//! [`Transport::subscribe`]. After a connection loss the event loop keeps
//! polling, which makes `rumqttc` reconnect, and every routed topic is
//! subscribed again once the broker acknowledges the new session.
//!
//! # Examples
//!
//! ```no_run
//! use haptique_rs90::protocol::MqttTransport;
//!
//! # async fn example() -> Result<(), haptique_rs90::error::ProtocolError> {
//! let transport = MqttTransport::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .build()
//!     .await?;
//!
//! // Hand a clone to the coordinator, keep one to disconnect later
//! let handle = transport.clone();
//! handle.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::error::ProtocolError;

use super::{Qos, Transport};

/// Counter making client IDs unique within the process.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Buffer size of each subscriber channel.
const SUBSCRIBER_CAPACITY: usize = 64;

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 64;

/// Connection settings of an [`MqttTransport`].
#[derive(Debug, Clone)]
pub struct MqttTransportConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    client_id: Option<String>,
    keep_alive: Duration,
    connection_timeout: Duration,
    reconnect_delay: Duration,
}

impl Default for MqttTransportConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl MqttTransportConfig {
    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// A shared MQTT broker connection.
///
/// Cheap to clone; all clones share the connection and the routing table.
#[derive(Clone)]
pub struct MqttTransport {
    inner: Arc<MqttTransportInner>,
}

struct MqttTransportInner {
    client: AsyncClient,
    /// Receivers by exact topic.
    routes: RwLock<HashMap<String, Vec<mpsc::Sender<String>>>>,
    config: MqttTransportConfig,
    connected: AtomicBool,
    /// Set once `disconnect` was requested; stops reconnect attempts.
    closing: AtomicBool,
}

impl MqttTransport {
    /// Creates a new builder for configuring the connection.
    #[must_use]
    pub fn builder() -> MqttTransportBuilder {
        MqttTransportBuilder::default()
    }

    /// Returns whether the broker connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the connection settings.
    #[must_use]
    pub fn config(&self) -> &MqttTransportConfig {
        &self.inner.config
    }

    /// Returns the number of topics with at least one receiver.
    pub async fn route_count(&self) -> usize {
        self.inner.routes.read().await.len()
    }

    /// Disconnects from the broker and ends every subscription stream.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );

        self.inner.closing.store(true, Ordering::Release);
        self.inner.routes.write().await.clear();

        self.inner
            .client
            .disconnect()
            .await
            .map_err(ProtocolError::Mqtt)?;

        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }

    /// Delivers an incoming publish to the receivers of its topic.
    async fn route_message(&self, topic: &str, payload: String) {
        let senders = {
            let mut routes = self.inner.routes.write().await;
            let Some(senders) = routes.get_mut(topic) else {
                tracing::trace!(topic = %topic, "No receiver for MQTT message");
                return;
            };
            senders.retain(|tx| !tx.is_closed());
            if senders.is_empty() {
                routes.remove(topic);
                return;
            }
            senders.clone()
        };

        for tx in senders {
            // Receiver may be gone if the topic was just unsubscribed
            let _ = tx.send(payload.clone()).await;
        }
    }

    /// Subscribes again to every routed topic after a reconnect.
    async fn resubscribe_all(&self) {
        let topics: Vec<String> = self.inner.routes.read().await.keys().cloned().collect();
        for topic in topics {
            if let Err(e) = self.inner.client.try_subscribe(&topic, QoS::AtLeastOnce) {
                tracing::warn!(topic = %topic, error = %e, "Failed to resubscribe after reconnect");
            }
        }
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl From<Qos> for QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
            Qos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

impl Transport for MqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>, ProtocolError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);

        // Register first so a retained message right after SubAck is routed
        self.inner
            .routes
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx.clone());

        if let Err(e) = self.inner.client.subscribe(topic, QoS::AtLeastOnce).await {
            let mut routes = self.inner.routes.write().await;
            if let Some(senders) = routes.get_mut(topic) {
                senders.retain(|s| !s.same_channel(&tx));
                if senders.is_empty() {
                    routes.remove(topic);
                }
            }
            return Err(ProtocolError::SubscribeFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            });
        }

        tracing::debug!(topic = %topic, "Subscribed to MQTT topic");
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.inner.routes.write().await.remove(topic);
        self.inner
            .client
            .unsubscribe(topic)
            .await
            .map_err(ProtocolError::Mqtt)?;
        tracing::debug!(topic = %topic, "Unsubscribed from MQTT topic");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: Qos,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        self.inner
            .client
            .publish(topic, qos.into(), retain, payload.as_bytes().to_vec())
            .await
            .map_err(|e| ProtocolError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(topic = %topic, payload = %payload, retain, "Published MQTT message");
        Ok(())
    }
}

/// Builder for an [`MqttTransport`].
///
/// # Examples
///
/// ```no_run
/// use haptique_rs90::protocol::MqttTransport;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), haptique_rs90::error::ProtocolError> {
/// let transport = MqttTransport::builder()
///     .host("192.168.1.50")
///     .keep_alive(Duration::from_secs(60))
///     .connection_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttTransportBuilder {
    config: MqttTransportConfig,
}

impl MqttTransportBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets a fixed client ID instead of a generated one.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the pause between reconnect attempts (default: 5 seconds).
    #[must_use]
    pub fn reconnect_delay(mut self, duration: Duration) -> Self {
        self.config.reconnect_delay = duration;
        self
    }

    /// Connects to the broker and waits for the connection acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns error if the host is not set, the connection fails, or the
    /// broker does not acknowledge within the connection timeout.
    pub async fn build(self) -> Result<MqttTransport, ProtocolError> {
        if self.config.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let client_id = self.config.client_id.clone().unwrap_or_else(|| {
            let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("haptique_rs90_{}_{}", std::process::id(), counter)
        });

        let mut mqtt_options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        let transport = MqttTransport {
            inner: Arc::new(MqttTransportInner {
                client,
                routes: RwLock::new(HashMap::new()),
                config: self.config.clone(),
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
            }),
        };

        let (connack_tx, connack_rx) = oneshot::channel();
        let events_transport = transport.clone();
        tokio::spawn(async move {
            handle_transport_events(event_loop, events_transport, connack_tx).await;
        });

        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %self.config.host,
                    port = %self.config.port,
                    client_id = %client_id,
                    "Connected to MQTT broker"
                );
                Ok(transport)
            }
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(
                "MQTT event loop terminated before the broker answered".to_string(),
            )),
            Err(_) => {
                // Stop the event loop task from retrying forever
                transport.inner.closing.store(true, Ordering::Release);
                Err(ProtocolError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }
}

/// Polls the event loop, routes publishes and handles reconnects.
async fn handle_transport_events(
    mut event_loop: EventLoop,
    transport: MqttTransport,
    connack_tx: oneshot::Sender<()>,
) {
    use rumqttc::{Event, Outgoing, Packet};

    let mut connack_tx = Some(connack_tx);

    loop {
        if transport.inner.closing.load(Ordering::Acquire) && connack_tx.is_some() {
            break;
        }

        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker acknowledged connection");
                transport.inner.connected.store(true, Ordering::Release);
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                } else {
                    tracing::info!("Reconnected to MQTT broker");
                    transport.resubscribe_all().await;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match String::from_utf8(publish.payload.to_vec()) {
                    Ok(payload) => {
                        tracing::debug!(
                            topic = %publish.topic,
                            payload = %payload,
                            "MQTT message received"
                        );
                        transport.route_message(&publish.topic, payload).await;
                    }
                    Err(e) => {
                        tracing::warn!(topic = %publish.topic, error = %e, "Dropping non UTF-8 payload");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect) | Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::info!("MQTT broker connection closed");
                transport.inner.connected.store(false, Ordering::Release);
                if transport.inner.closing.load(Ordering::Acquire) {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                transport.inner.connected.store(false, Ordering::Release);
                if connack_tx.is_some() || transport.inner.closing.load(Ordering::Acquire) {
                    tracing::error!(error = %e, "MQTT event loop error");
                    break;
                }
                tracing::warn!(
                    error = %e,
                    retry_in = ?transport.inner.config.reconnect_delay,
                    "MQTT connection lost, reconnecting"
                );
                tokio::time::sleep(transport.inner.config.reconnect_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_default_values() {
        let builder = MqttTransportBuilder::default();
        assert_eq!(builder.config.port, 1883);
        assert!(builder.config.host.is_empty());
        assert!(builder.config.credentials.is_none());
        assert!(builder.config.client_id.is_none());
        assert_eq!(builder.config.keep_alive, Duration::from_secs(30));
        assert_eq!(builder.config.connection_timeout, Duration::from_secs(10));
        assert_eq!(builder.config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn builder_chain() {
        let builder = MqttTransportBuilder::default()
            .host("192.168.1.50")
            .port(8883)
            .credentials("admin", "secret")
            .client_id("rs90-bridge")
            .keep_alive(Duration::from_secs(45))
            .connection_timeout(Duration::from_secs(15))
            .reconnect_delay(Duration::from_secs(1));

        assert_eq!(builder.config.host(), "192.168.1.50");
        assert_eq!(builder.config.port(), 8883);
        assert_eq!(
            builder.config.credentials,
            Some(("admin".to_string(), "secret".to_string()))
        );
        assert_eq!(builder.config.client_id.as_deref(), Some("rs90-bridge"));
        assert_eq!(builder.config.keep_alive, Duration::from_secs(45));
        assert_eq!(builder.config.connection_timeout, Duration::from_secs(15));
        assert_eq!(builder.config.reconnect_delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn builder_missing_host_fails() {
        let result = MqttTransportBuilder::default().build().await;
        assert!(matches!(result, Err(ProtocolError::InvalidAddress(_))));
    }

    #[test]
    fn qos_maps_to_rumqttc() {
        assert_eq!(QoS::from(Qos::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(QoS::from(Qos::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(QoS::from(Qos::ExactlyOnce), QoS::ExactlyOnce);
    }
}
