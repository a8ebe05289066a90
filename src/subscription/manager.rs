// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live topic subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ProtocolError;
use crate::protocol::{Route, Transport};

/// A payload received on a subscribed topic, tagged with its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The handler this message feeds.
    pub route: Route,
    /// The topic it arrived on.
    pub topic: String,
    /// The raw payload.
    pub payload: String,
}

struct SubscriptionHandle {
    route: Route,
    forwarder: JoinHandle<()>,
}

/// Tracks one live subscription per topic.
///
/// Every subscription owns a forwarder task that moves payloads from the
/// transport stream into a single inbound channel, so all messages are
/// processed sequentially by whoever drains that channel. Aborting the
/// forwarder detaches the handler: anything the transport still delivers
/// afterwards is dropped.
pub struct SubscriptionManager<T: Transport> {
    transport: Arc<T>,
    inbound: mpsc::Sender<InboundMessage>,
    handles: Mutex<HashMap<String, SubscriptionHandle>>,
}

impl<T: Transport> SubscriptionManager<T> {
    /// Creates a manager forwarding into `inbound`.
    #[must_use]
    pub fn new(transport: Arc<T>, inbound: mpsc::Sender<InboundMessage>) -> Self {
        Self {
            transport,
            inbound,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Subscribes to a topic and forwards its payloads tagged with `route`.
    ///
    /// Returns `Ok(true)` if a new subscription was created and `Ok(false)`
    /// if the topic was already tracked.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the subscription could not be
    /// established. The failure is logged and the topic stays untracked.
    pub async fn subscribe(&self, topic: &str, route: Route) -> Result<bool, ProtocolError> {
        if self.handles.lock().contains_key(topic) {
            tracing::trace!(topic = %topic, "Topic already subscribed");
            return Ok(false);
        }

        let mut rx = match self.transport.subscribe(topic).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(topic = %topic, route = %route, error = %e, "Failed to subscribe");
                return Err(e);
            }
        };

        let mut handles = self.handles.lock();
        if handles.contains_key(topic) {
            // A concurrent call won; its forwarder already feeds this topic
            return Ok(false);
        }

        let inbound = self.inbound.clone();
        let forward_route = route.clone();
        let forward_topic = topic.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let message = InboundMessage {
                    route: forward_route.clone(),
                    topic: forward_topic.clone(),
                    payload,
                };
                if inbound.send(message).await.is_err() {
                    break;
                }
            }
        });

        handles.insert(topic.to_string(), SubscriptionHandle { route, forwarder });
        tracing::debug!(topic = %topic, "Subscription registered");
        Ok(true)
    }

    /// Detaches a topic.
    ///
    /// Returns `true` if the topic was tracked. Transport errors are logged
    /// and swallowed; the handler is detached either way.
    pub async fn unsubscribe(&self, topic: &str) -> bool {
        let Some(handle) = self.handles.lock().remove(topic) else {
            return false;
        };
        handle.forwarder.abort();

        if let Err(e) = self.transport.unsubscribe(topic).await {
            tracing::warn!(topic = %topic, error = %e, "Failed to unsubscribe");
        } else {
            tracing::debug!(topic = %topic, route = %handle.route, "Subscription removed");
        }
        true
    }

    /// Detaches every tracked topic and returns how many there were.
    ///
    /// Calling it with nothing tracked is a no-op.
    pub async fn unsubscribe_all(&self) -> usize {
        let drained: Vec<(String, SubscriptionHandle)> = self.handles.lock().drain().collect();
        if drained.is_empty() {
            return 0;
        }

        for (_, handle) in &drained {
            handle.forwarder.abort();
        }
        for (topic, _) in &drained {
            if let Err(e) = self.transport.unsubscribe(topic).await {
                tracing::warn!(topic = %topic, error = %e, "Failed to unsubscribe");
            }
        }

        tracing::debug!(count = drained.len(), "All subscriptions removed");
        drained.len()
    }

    /// Returns `true` if the topic is tracked.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.handles.lock().contains_key(topic)
    }

    /// Returns the route of a tracked topic.
    #[must_use]
    pub fn route_of(&self, topic: &str) -> Option<Route> {
        self.handles.lock().get(topic).map(|h| h.route.clone())
    }

    /// Returns every tracked topic, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handles.lock().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Returns the number of tracked topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

impl<T: Transport> Drop for SubscriptionManager<T> {
    fn drop(&mut self) {
        for handle in self.handles.get_mut().values() {
            handle.forwarder.abort();
        }
    }
}

impl<T: Transport> std::fmt::Debug for SubscriptionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("topics", &self.topics())
            .finish_non_exhaustive()
    }
}
