// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process loopback transport.
//!
//! [`MemoryTransport`] behaves like a tiny broker living in the same
//! process: a publish is delivered to every receiver subscribed to the exact
//! same topic, retained payloads are replayed to new subscribers, and an
//! empty retained publish clears the retained slot. Every call is recorded
//! so tests can assert on the traffic the coordinator produced.
//!
//! # Examples
//!
//! ```
//! use haptique_rs90::protocol::{MemoryTransport, Qos, Transport};
//!
//! # async fn example() -> Result<(), haptique_rs90::error::ProtocolError> {
//! let transport = MemoryTransport::new();
//! let mut rx = transport.subscribe("haptique/rs90/status").await?;
//!
//! transport.inject("haptique/rs90/status", "online").await;
//! assert_eq!(rx.recv().await.as_deref(), Some("online"));
//!
//! transport.publish("haptique/rs90/battery/status", "", Qos::AtLeastOnce, false).await?;
//! assert_eq!(transport.published_to("haptique/rs90/battery/status").len(), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::ProtocolError;

use super::{Qos, Transport};

/// Buffer size of each subscriber channel.
const SUBSCRIBER_CAPACITY: usize = 64;

/// A publish recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Destination topic.
    pub topic: String,
    /// Payload text.
    pub payload: String,
    /// Requested delivery guarantee.
    pub qos: Qos,
    /// Whether the retained flag was set.
    pub retain: bool,
}

/// Loopback transport that keeps everything in memory.
///
/// Cloning is cheap and every clone shares the same broker state, so a test
/// can hand one clone to the coordinator and inspect traffic through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryBroker>>,
}

#[derive(Debug, Default)]
struct MemoryBroker {
    subscribers: HashMap<String, Vec<mpsc::Sender<String>>>,
    retained: HashMap<String, String>,
    published: Vec<Published>,
    subscribe_calls: Vec<String>,
    unsubscribe_calls: Vec<String>,
    failing_subscribes: HashSet<String>,
    fail_publishes: bool,
    subscribe_delay: Option<Duration>,
}

impl MemoryTransport {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a payload as if the hub had published it (not retained).
    pub async fn inject(&self, topic: &str, payload: &str) {
        self.deliver(topic, payload).await;
    }

    /// Delivers a payload and stores it as the topic's retained message.
    pub async fn inject_retained(&self, topic: &str, payload: &str) {
        self.store_retained(topic, payload);
        self.deliver(topic, payload).await;
    }

    /// Makes every subscribe to `topic` fail until cleared.
    pub fn fail_subscribe(&self, topic: impl Into<String>) {
        self.inner.lock().failing_subscribes.insert(topic.into());
    }

    /// Lets subscribes to `topic` succeed again.
    pub fn clear_subscribe_failure(&self, topic: &str) {
        self.inner.lock().failing_subscribes.remove(topic);
    }

    /// Makes every publish fail (`true`) or succeed (`false`).
    pub fn fail_publishes(&self, fail: bool) {
        self.inner.lock().fail_publishes = fail;
    }

    /// Delays every subscribe by `delay`, simulating a slow broker.
    pub fn set_subscribe_delay(&self, delay: Option<Duration>) {
        self.inner.lock().subscribe_delay = delay;
    }

    /// Returns every successful publish, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.inner.lock().published.clone()
    }

    /// Returns the successful publishes to one topic, oldest first.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<Published> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    /// Returns every subscribe call, including failed ones, in call order.
    #[must_use]
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.inner.lock().subscribe_calls.clone()
    }

    /// Returns how many times `topic` was subscribed.
    #[must_use]
    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .subscribe_calls
            .iter()
            .filter(|t| *t == topic)
            .count()
    }

    /// Returns every unsubscribe call in call order.
    #[must_use]
    pub fn unsubscribe_calls(&self) -> Vec<String> {
        self.inner.lock().unsubscribe_calls.clone()
    }

    /// Returns `true` if a live receiver is subscribed to `topic`.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner
            .lock()
            .subscribers
            .get(topic)
            .is_some_and(|senders| senders.iter().any(|tx| !tx.is_closed()))
    }

    /// Returns the topics that currently have a live receiver, sorted.
    #[must_use]
    pub fn active_topics(&self) -> Vec<String> {
        let broker = self.inner.lock();
        let mut topics: Vec<String> = broker
            .subscribers
            .iter()
            .filter(|(_, senders)| senders.iter().any(|tx| !tx.is_closed()))
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// Returns the retained payload of a topic.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<String> {
        self.inner.lock().retained.get(topic).cloned()
    }

    fn store_retained(&self, topic: &str, payload: &str) {
        let mut broker = self.inner.lock();
        if payload.is_empty() {
            broker.retained.remove(topic);
        } else {
            broker.retained.insert(topic.to_string(), payload.to_string());
        }
    }

    async fn deliver(&self, topic: &str, payload: &str) {
        let senders = {
            let mut broker = self.inner.lock();
            let Some(senders) = broker.subscribers.get_mut(topic) else {
                tracing::trace!(topic = %topic, "No memory subscriber for topic");
                return;
            };
            senders.retain(|tx| !tx.is_closed());
            senders.clone()
        };

        for tx in senders {
            // Receiver may have been dropped since the lock was released
            let _ = tx.send(payload.to_string()).await;
        }
    }
}

impl Transport for MemoryTransport {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>, ProtocolError> {
        let delay = {
            let mut broker = self.inner.lock();
            broker.subscribe_calls.push(topic.to_string());
            if broker.failing_subscribes.contains(topic) {
                return Err(ProtocolError::SubscribeFailed {
                    topic: topic.to_string(),
                    reason: "rejected by memory broker".to_string(),
                });
            }
            broker.subscribe_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut broker = self.inner.lock();
        if let Some(retained) = broker.retained.get(topic) {
            // Fresh channel, cannot be full
            let _ = tx.try_send(retained.clone());
        }
        broker
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        let mut broker = self.inner.lock();
        broker.unsubscribe_calls.push(topic.to_string());
        broker.subscribers.remove(topic);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: Qos,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        {
            let mut broker = self.inner.lock();
            if broker.fail_publishes {
                return Err(ProtocolError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "rejected by memory broker".to_string(),
                });
            }
            broker.published.push(Published {
                topic: topic.to_string(),
                payload: payload.to_string(),
                qos,
                retain,
            });
        }

        if retain {
            self.store_retained(topic, payload);
        }
        self.deliver(topic, payload).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_loops_back_to_subscriber() {
        let transport = MemoryTransport::new();
        let mut rx = transport.subscribe("a/b").await.unwrap();

        transport
            .publish("a/b", "hello", Qos::AtLeastOnce, false)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn retained_replayed_on_subscribe() {
        let transport = MemoryTransport::new();
        transport.inject_retained("a/b", "on").await;

        let mut rx = transport.subscribe("a/b").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("on"));
    }

    #[tokio::test]
    async fn empty_retained_publish_clears_slot() {
        let transport = MemoryTransport::new();
        transport.inject_retained("a/b", "on").await;
        transport
            .publish("a/b", "", Qos::AtLeastOnce, true)
            .await
            .unwrap();
        assert!(transport.retained("a/b").is_none());
    }

    #[tokio::test]
    async fn failing_subscribe_is_recorded() {
        let transport = MemoryTransport::new();
        transport.fail_subscribe("a/b");

        let result = transport.subscribe("a/b").await;
        assert!(matches!(
            result,
            Err(ProtocolError::SubscribeFailed { .. })
        ));
        assert_eq!(transport.subscribe_count("a/b"), 1);
        assert!(!transport.is_subscribed("a/b"));
    }

    #[tokio::test]
    async fn failing_publish_not_recorded() {
        let transport = MemoryTransport::new();
        transport.fail_publishes(true);
        let result = transport.publish("a/b", "x", Qos::AtLeastOnce, false).await;
        assert!(result.is_err());
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_ends_stream() {
        let transport = MemoryTransport::new();
        let mut rx = transport.subscribe("a/b").await.unwrap();
        transport.unsubscribe("a/b").await.unwrap();

        assert!(rx.recv().await.is_none());
        assert!(!transport.is_subscribed("a/b"));
        assert_eq!(transport.unsubscribe_calls(), vec!["a/b".to_string()]);
    }
}
