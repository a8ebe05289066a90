// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device and macro discovery.
//!
//! The hub announces what it controls on two list topics, `devices` and
//! `macros`, each carrying a JSON array of `{id | Id, name}` records. Every
//! list message is a discovery cycle: the names it contains are compared
//! with the names currently backed by subscriptions, and the difference
//! drives subscribe / unsubscribe round trips.
//!
//! # Discovery Mechanism
//!
//! 1. [`parse_records`] turns a list payload into normalized [`Entity`]
//!    records. Malformed payloads are rejected as a whole so the previous
//!    list stays in place.
//! 2. [`Discovery::reconcile`] computes the [`NameDelta`] and marks added
//!    names subscribed immediately, before any round trip completes, so a
//!    burst of identical list messages cannot subscribe a name twice.
//! 3. [`subscribe_device`] / [`subscribe_macro`] run as background units
//!    and establish the per-name topics.
//!
//! # Examples
//!
//! ```
//! use haptique_rs90::discovery::{Discovery, parse_records};
//! use haptique_rs90::types::EntityKind;
//!
//! let mut discovery = Discovery::new();
//!
//! let d1 = parse_records(r#"[{"id": 1, "name": "TV"}, {"Id": "2", "name": "Amp"}]"#).unwrap();
//! let delta = discovery.reconcile(EntityKind::Device, &d1);
//! assert_eq!(delta.added, vec!["Amp", "TV"]);
//!
//! let d2 = parse_records(r#"[{"id": 1, "name": "TV"}, {"id": 3, "name": "Bluray"}]"#).unwrap();
//! let delta = discovery.reconcile(EntityKind::Device, &d2);
//! assert_eq!(delta.added, vec!["Bluray"]);
//! assert_eq!(delta.removed, vec!["Amp"]);
//! ```

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::{ParseError, ProtocolError};
use crate::protocol::{Qos, Route, Topics, Transport};
use crate::state::StateChange;
use crate::subscription::SubscriptionManager;
use crate::types::{Entity, EntityKind};

/// Parses a list payload into normalized records.
///
/// The payload must be a JSON array. Elements that are not objects are
/// skipped with a warning. The identifier is taken from `id`, falling back
/// to `Id` when `id` is missing, null, empty, zero or false; numbers are
/// rendered as strings. `name` is kept only when it is a string.
///
/// # Errors
///
/// Returns `ParseError::Json` for invalid JSON and
/// `ParseError::UnexpectedFormat` when the document is not an array.
pub fn parse_records(payload: &str) -> Result<Vec<Entity>, ParseError> {
    let value: Value = serde_json::from_str(payload)?;
    let Value::Array(items) = value else {
        return Err(ParseError::UnexpectedFormat(format!(
            "expected a JSON array, got {}",
            kind_of(&value)
        )));
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Value::Object(fields) = item else {
            tracing::warn!(index, kind = kind_of(item), "Skipping non-object list record");
            continue;
        };
        records.push(Entity {
            id: normalize_id(fields),
            name: fields.get("name").and_then(Value::as_str).map(str::to_string),
        });
    }
    Ok(records)
}

/// Parses a device detail payload into a catalog change.
///
/// Returns `Ok(None)` for an empty payload: that is the echo of our own
/// empty request, not an empty catalog.
///
/// # Errors
///
/// Returns the [`parse_records`] error for a malformed catalog.
pub fn parse_catalog(device: &str, payload: &str) -> Result<Option<StateChange>, ParseError> {
    if payload.trim().is_empty() {
        return Ok(None);
    }
    let commands = parse_records(payload)?;
    Ok(Some(StateChange::device_commands(device, commands)))
}

fn normalize_id(fields: &Map<String, Value>) -> Option<String> {
    fields
        .get("id")
        .filter(|v| is_set(v))
        .or_else(|| fields.get("Id"))
        .filter(|v| is_set(v))
        .and_then(render_id)
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn render_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Names to subscribe and unsubscribe after one discovery cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameDelta {
    /// Names present in the list but not yet subscribed, sorted.
    pub added: Vec<String>,
    /// Names subscribed but missing from the list, sorted.
    pub removed: Vec<String>,
}

impl NameDelta {
    /// Computes `current - subscribed` and `subscribed - current`.
    #[must_use]
    pub fn compute(current: &BTreeSet<String>, subscribed: &BTreeSet<String>) -> Self {
        Self {
            added: current.difference(subscribed).cloned().collect(),
            removed: subscribed.difference(current).cloned().collect(),
        }
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Tracks which names are backed by live subscriptions.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    devices: BTreeSet<String>,
    macros: BTreeSet<String>,
}

impl Discovery {
    /// Creates a tracker with nothing subscribed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, kind: EntityKind) -> &BTreeSet<String> {
        match kind {
            EntityKind::Device => &self.devices,
            EntityKind::Macro => &self.macros,
        }
    }

    fn set_mut(&mut self, kind: EntityKind) -> &mut BTreeSet<String> {
        match kind {
            EntityKind::Device => &mut self.devices,
            EntityKind::Macro => &mut self.macros,
        }
    }

    /// Brings the subscribed set of `kind` in line with a fresh list.
    ///
    /// Added names are marked and removed names unmarked before this
    /// returns; unnamed records are ignored.
    pub fn reconcile(&mut self, kind: EntityKind, records: &[Entity]) -> NameDelta {
        let current: BTreeSet<String> = records
            .iter()
            .filter_map(Entity::name)
            .map(str::to_string)
            .collect();

        let set = self.set_mut(kind);
        let delta = NameDelta::compute(&current, set);
        set.extend(delta.added.iter().cloned());
        for name in &delta.removed {
            set.remove(name);
        }
        delta
    }

    /// Returns `true` if `name` is marked subscribed.
    #[must_use]
    pub fn is_subscribed(&self, kind: EntityKind, name: &str) -> bool {
        self.set(kind).contains(name)
    }

    /// Unmarks a name, e.g. after a failed round trip.
    ///
    /// Returns `true` if it was marked.
    pub fn unmark(&mut self, kind: EntityKind, name: &str) -> bool {
        self.set_mut(kind).remove(name)
    }

    /// Device names backed by subscriptions.
    #[must_use]
    pub fn devices(&self) -> &BTreeSet<String> {
        &self.devices
    }

    /// Macro names backed by subscriptions.
    #[must_use]
    pub fn macros(&self) -> &BTreeSet<String> {
        &self.macros
    }
}

/// Subscribes both catalog topics of a device and requests its catalog.
///
/// The two subscriptions are all-or-nothing: if one fails, the other is
/// rolled back. Request publishes are empty and retained; their failures
/// are logged only, the refresh tick asks again.
///
/// # Errors
///
/// Returns the first subscribe error.
pub async fn subscribe_device<T: Transport>(
    subscriptions: &SubscriptionManager<T>,
    topics: &Topics,
    name: &str,
) -> Result<(), ProtocolError> {
    let catalog_topics = topics.device_catalog_topics(name);
    let mut created = Vec::with_capacity(catalog_topics.len());

    for topic in &catalog_topics {
        match subscriptions
            .subscribe(topic, Route::DeviceDetail(name.to_string()))
            .await
        {
            Ok(true) => created.push(topic),
            Ok(false) => {}
            Err(e) => {
                for topic in created {
                    subscriptions.unsubscribe(topic).await;
                }
                return Err(e);
            }
        }
    }

    let transport = subscriptions.transport();
    for topic in &catalog_topics {
        if let Err(e) = transport.publish(topic, "", Qos::AtLeastOnce, true).await {
            tracing::error!(topic = %topic, device = %name, error = %e, "Failed to request device catalog");
        }
    }

    tracing::info!(device = %name, "Subscribed to device catalog");
    Ok(())
}

/// Subscribes the trigger topic of a macro.
///
/// Nothing is published: the retained trigger value is the answer, and an
/// empty retained publish would erase it.
///
/// # Errors
///
/// Returns the subscribe error.
pub async fn subscribe_macro<T: Transport>(
    subscriptions: &SubscriptionManager<T>,
    topics: &Topics,
    name: &str,
) -> Result<(), ProtocolError> {
    subscriptions
        .subscribe(
            &topics.macro_trigger(name),
            Route::MacroTrigger(name.to_string()),
        )
        .await?;
    tracing::info!(name = %name, "Subscribed to macro trigger");
    Ok(())
}

/// Detaches every topic owned by a discovered name.
pub async fn detach<T: Transport>(
    subscriptions: &SubscriptionManager<T>,
    topics: &Topics,
    kind: EntityKind,
    name: &str,
) {
    match kind {
        EntityKind::Device => {
            for topic in topics.device_catalog_topics(name) {
                subscriptions.unsubscribe(&topic).await;
            }
        }
        EntityKind::Macro => {
            subscriptions.unsubscribe(&topics.macro_trigger(name)).await;
        }
    }
    tracing::info!(kind = kind.as_str(), name = %name, "Detached discovered name");
}
