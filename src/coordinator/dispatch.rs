// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The dispatch task.
//!
//! One task owns the [`RemoteState`] and processes, strictly one at a time,
//! handle requests, inbound messages, refresh ticks and the outcomes of
//! background units. Transport round trips never run inline: they are
//! spawned into a [`JoinSet`] and report back as a [`UnitOutcome`], so a
//! slow broker cannot stall message dispatch.
//!
//! Units touching the same discovered name are chained: each one starts
//! only after the previous unit for that name has finished, so a detach and
//! a later re-subscribe can never reach the transport out of order.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::discovery::{self, Discovery};
use crate::error::{Error, ProtocolError};
use crate::persistence::PersistenceWorker;
use crate::protocol::{Route, Topics, Transport};
use crate::state::{RemoteState, StateChange};
use crate::subscription::{InboundMessage, ListenerRegistry, SubscriptionManager};
use crate::telemetry;
use crate::types::{EntityKind, MacroState};

use super::commands::{self, MacroAction};
use super::diagnostics::Diagnostics;
use super::refresh::{self, FanOut, RefreshReport};

/// A request sent by a [`Coordinator`](super::Coordinator) handle.
pub(crate) enum Request {
    TriggerMacro {
        name: String,
        action: MacroAction,
        reply: oneshot::Sender<Result<MacroState, Error>>,
    },
    TriggerDeviceCommand {
        device: String,
        command: String,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    ForceRefresh {
        reply: oneshot::Sender<Result<RefreshReport, Error>>,
    },
    Diagnostics {
        reply: oneshot::Sender<Diagnostics>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// What a background unit reports when it finishes.
enum UnitOutcome {
    Subscribed {
        kind: EntityKind,
        name: String,
        seq: u64,
        result: Result<(), ProtocolError>,
    },
    Detached {
        kind: EntityKind,
        name: String,
        seq: u64,
    },
    Done,
    MacroPublished {
        name: String,
        state: MacroState,
        result: Result<(), ProtocolError>,
        reply: oneshot::Sender<Result<MacroState, Error>>,
    },
    Refreshed {
        fan_out: FanOut,
        reply: Option<oneshot::Sender<Result<RefreshReport, Error>>>,
    },
}

/// Per-name ordering of discovery units.
#[derive(Debug, Default)]
struct UnitChains {
    next_seq: u64,
    tails: HashMap<(EntityKind, String), (u64, oneshot::Receiver<()>)>,
}

impl UnitChains {
    /// Queues a unit for `name`. Returns its sequence number, the completion
    /// of the unit it must wait for, and its own completion signal.
    fn link(
        &mut self,
        kind: EntityKind,
        name: &str,
    ) -> (u64, Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self
            .tails
            .insert((kind, name.to_string()), (seq, done_rx))
            .map(|(_, rx)| rx);
        (seq, previous, done_tx)
    }

    /// Forgets a finished unit. Returns `true` if no later unit for the same
    /// name was queued after it.
    fn finish(&mut self, kind: EntityKind, name: &str, seq: u64) -> bool {
        let key = (kind, name.to_string());
        match self.tails.get(&key) {
            Some((tail, _)) if *tail == seq => {
                self.tails.remove(&key);
                true
            }
            _ => false,
        }
    }

    fn pending(&self) -> usize {
        self.tails.len()
    }
}

pub(crate) struct Dispatcher<T: Transport> {
    remote_id: String,
    topics: Topics,
    state: RemoteState,
    discovery: Discovery,
    subscriptions: Arc<SubscriptionManager<T>>,
    listeners: Arc<ListenerRegistry>,
    state_tx: watch::Sender<RemoteState>,
    persistence: PersistenceWorker,
    tasks: JoinSet<UnitOutcome>,
    chains: UnitChains,
    refresh_in_flight: bool,
    started_at: DateTime<Utc>,
    last_message_at: Option<DateTime<Utc>>,
    last_refresh_at: Option<DateTime<Utc>>,
}

impl<T: Transport> Dispatcher<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        remote_id: String,
        topics: Topics,
        state: RemoteState,
        subscriptions: Arc<SubscriptionManager<T>>,
        listeners: Arc<ListenerRegistry>,
        state_tx: watch::Sender<RemoteState>,
        persistence: PersistenceWorker,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            remote_id,
            topics,
            state,
            discovery: Discovery::new(),
            subscriptions,
            listeners,
            state_tx,
            persistence,
            tasks: JoinSet::new(),
            chains: UnitChains::default(),
            refresh_in_flight: false,
            started_at,
            last_message_at: None,
            last_refresh_at: None,
        }
    }

    /// Runs until a shutdown request arrives or every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        refresh_interval: std::time::Duration,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + refresh_interval, refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(remote_id = %self.remote_id, "Coordinator dispatch started");

        let shutdown_reply = loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Shutdown { reply }) => break Some(reply),
                    Some(request) => self.handle_request(request),
                    None => break None,
                },
                Some(message) = inbound.recv() => self.handle_inbound(message),
                _ = ticker.tick() => {
                    if self.refresh_in_flight {
                        tracing::debug!("Previous refresh still running, skipping tick");
                    } else {
                        self.spawn_refresh(None);
                    }
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.handle_joined(joined);
                }
            }
        };

        self.shutdown().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    async fn shutdown(self) {
        let in_flight = self.tasks.len();
        let chained = self.chains.pending();
        let mut tasks = self.tasks;
        tasks.shutdown().await;

        let detached = self.subscriptions.unsubscribe_all().await;
        self.persistence.shutdown().await;

        tracing::info!(
            remote_id = %self.remote_id,
            aborted_units = in_flight,
            chained_names = chained,
            detached,
            "Coordinator stopped"
        );
    }

    /// Applies a change, then publishes the snapshot, persists macro states
    /// and notifies listeners. Changes that alter nothing are dropped.
    fn apply(&mut self, change: StateChange) {
        if !self.state.apply(&change) {
            return;
        }
        self.state_tx.send_replace(self.state.clone());
        if change.touches_macro_states() {
            self.persistence.request(self.state.macro_states.clone());
        }
        self.listeners.notify(&change, &self.state);
    }

    // =========================================================================
    // Requests
    // =========================================================================

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::TriggerMacro {
                name,
                action,
                reply,
            } => {
                let state = action.resolve(self.state.macro_state(&name));
                let subscriptions = Arc::clone(&self.subscriptions);
                let topics = self.topics.clone();
                self.tasks.spawn(async move {
                    let result =
                        commands::publish_macro(subscriptions.transport().as_ref(), &topics, &name, state)
                            .await;
                    UnitOutcome::MacroPublished {
                        name,
                        state,
                        result,
                        reply,
                    }
                });
            }
            Request::TriggerDeviceCommand {
                device,
                command,
                reply,
            } => {
                let subscriptions = Arc::clone(&self.subscriptions);
                let topics = self.topics.clone();
                self.tasks.spawn(async move {
                    let result = commands::publish_device_command(
                        subscriptions.transport().as_ref(),
                        &topics,
                        &device,
                        &command,
                    )
                    .await;
                    let _ = reply.send(result.map_err(Error::from));
                    UnitOutcome::Done
                });
            }
            Request::ForceRefresh { reply } => self.spawn_refresh(Some(reply)),
            Request::Diagnostics { reply } => {
                let _ = reply.send(self.diagnostics());
            }
            Request::Shutdown { .. } => {
                // Intercepted by the run loop
            }
        }
    }

    fn spawn_refresh(&mut self, reply: Option<oneshot::Sender<Result<RefreshReport, Error>>>) {
        self.refresh_in_flight = true;
        let devices: Vec<String> = self.discovery.devices().iter().cloned().collect();
        let subscriptions = Arc::clone(&self.subscriptions);
        let topics = self.topics.clone();
        self.tasks.spawn(async move {
            let fan_out =
                refresh::send_requests(subscriptions.transport().as_ref(), &topics, &devices).await;
            UnitOutcome::Refreshed { fan_out, reply }
        });
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            remote_id: self.remote_id.clone(),
            status: self.state.status,
            devices_count: self.state.devices.len(),
            devices: self.state.devices.clone(),
            macros_count: self.state.macros.len(),
            macros: self.state.macros.clone(),
            device_commands: self
                .state
                .device_commands
                .iter()
                .map(|(device, commands)| (device.clone(), commands.len()))
                .collect(),
            subscriptions_count: self.subscriptions.len(),
            subscribed_devices: self.discovery.devices().iter().cloned().collect(),
            subscribed_macros: self.discovery.macros().iter().cloned().collect(),
            started_at: self.started_at,
            last_message_at: self.last_message_at,
            last_refresh_at: self.last_refresh_at,
        }
    }

    // =========================================================================
    // Inbound messages
    // =========================================================================

    fn handle_inbound(&mut self, message: InboundMessage) {
        self.last_message_at = Some(Utc::now());
        let InboundMessage {
            route,
            topic,
            payload,
        } = message;
        tracing::debug!(topic = %topic, route = %route, payload = %payload, "Processing message");

        match route {
            Route::Status => self.apply(telemetry::parse_status(&payload)),
            Route::TestStatus => self.apply(telemetry::parse_test_status(&payload)),
            Route::BatteryLevel => match telemetry::parse_battery(&payload) {
                Ok(change) => self.apply(change),
                Err(e) => tracing::warn!(topic = %topic, error = %e, "Ignoring battery payload"),
            },
            Route::Keys => match telemetry::parse_key(&payload) {
                Ok(change) => self.apply(change),
                Err(e) => tracing::warn!(topic = %topic, error = %e, "Ignoring key payload"),
            },
            Route::DeviceList => self.handle_list(EntityKind::Device, &topic, &payload),
            Route::MacroList => self.handle_list(EntityKind::Macro, &topic, &payload),
            Route::DeviceDetail(device) => self.handle_catalog(&device, &topic, &payload),
            Route::MacroTrigger(name) => match telemetry::parse_macro_trigger(&name, &payload) {
                Ok(change) => self.apply(change),
                Err(e) => tracing::debug!(topic = %topic, error = %e, "Ignoring macro trigger payload"),
            },
        }
    }

    fn handle_list(&mut self, kind: EntityKind, topic: &str, payload: &str) {
        let records = match discovery::parse_records(payload) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Discarding malformed list, keeping previous");
                return;
            }
        };

        let current: BTreeSet<String> = records
            .iter()
            .filter_map(|r| r.name())
            .map(str::to_string)
            .collect();
        let delta = self.discovery.reconcile(kind, &records);

        self.apply(match kind {
            EntityKind::Device => StateChange::Devices(records),
            EntityKind::Macro => StateChange::Macros(records),
        });

        if !delta.is_empty() {
            tracing::info!(
                kind = kind.as_str(),
                added = ?delta.added,
                removed = ?delta.removed,
                "Discovery cycle"
            );
        }

        for name in &delta.removed {
            self.spawn_detach(kind, name.clone());
        }

        // Purge cached data of every name missing from the list, including
        // entries restored from disk that were never subscribed this session
        match kind {
            EntityKind::Device => {
                let stale: Vec<String> = self
                    .state
                    .device_commands
                    .keys()
                    .filter(|device| !current.contains(*device))
                    .cloned()
                    .collect();
                for device in stale {
                    self.apply(StateChange::DeviceCommandsRemoved { device });
                }
            }
            EntityKind::Macro => {
                let stale: Vec<String> = self
                    .state
                    .macro_states
                    .keys()
                    .filter(|name| !current.contains(*name))
                    .cloned()
                    .collect();
                for name in stale {
                    self.apply(StateChange::MacroStateRemoved { name });
                }
            }
        }

        for name in delta.added {
            self.spawn_subscribe(kind, name);
        }
    }

    fn handle_catalog(&mut self, device: &str, topic: &str, payload: &str) {
        if !self.discovery.is_subscribed(EntityKind::Device, device) {
            tracing::debug!(topic = %topic, device = %device, "Dropping catalog of removed device");
            return;
        }
        match discovery::parse_catalog(device, payload) {
            Ok(Some(change)) => self.apply(change),
            Ok(None) => tracing::trace!(topic = %topic, "Ignoring echo of catalog request"),
            Err(e) => tracing::warn!(topic = %topic, error = %e, "Ignoring malformed device catalog"),
        }
    }

    // =========================================================================
    // Background units
    // =========================================================================

    fn spawn_subscribe(&mut self, kind: EntityKind, name: String) {
        let (seq, previous, done) = self.chains.link(kind, &name);
        let subscriptions = Arc::clone(&self.subscriptions);
        let topics = self.topics.clone();
        self.tasks.spawn(async move {
            if let Some(previous) = previous {
                // Err means the previous unit was aborted or panicked
                let _ = previous.await;
            }
            let result = match kind {
                EntityKind::Device => discovery::subscribe_device(&subscriptions, &topics, &name).await,
                EntityKind::Macro => discovery::subscribe_macro(&subscriptions, &topics, &name).await,
            };
            let _ = done.send(());
            UnitOutcome::Subscribed {
                kind,
                name,
                seq,
                result,
            }
        });
    }

    fn spawn_detach(&mut self, kind: EntityKind, name: String) {
        let (seq, previous, done) = self.chains.link(kind, &name);
        let subscriptions = Arc::clone(&self.subscriptions);
        let topics = self.topics.clone();
        self.tasks.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            discovery::detach(&subscriptions, &topics, kind, &name).await;
            let _ = done.send(());
            UnitOutcome::Detached { kind, name, seq }
        });
    }

    fn handle_joined(&mut self, joined: Result<UnitOutcome, JoinError>) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                tracing::error!(error = %e, "Background unit panicked");
                return;
            }
        };

        match outcome {
            UnitOutcome::Subscribed {
                kind,
                name,
                seq,
                result,
            } => {
                // A removal always queues a detach behind this unit
                let latest = self.chains.finish(kind, &name, seq);
                match result {
                    Ok(()) => {}
                    Err(e) if latest => {
                        self.discovery.unmark(kind, &name);
                        tracing::warn!(
                            kind = kind.as_str(),
                            name = %name,
                            error = %e,
                            "Subscription failed, retrying on next list message"
                        );
                    }
                    Err(e) => {
                        tracing::debug!(
                            kind = kind.as_str(),
                            name = %name,
                            error = %e,
                            "Subscription failed, superseded by a later unit"
                        );
                    }
                }
            }
            UnitOutcome::Detached { kind, name, seq } => {
                self.chains.finish(kind, &name, seq);
            }
            UnitOutcome::Done => {}
            UnitOutcome::MacroPublished {
                name,
                state,
                result,
                reply,
            } => {
                let result = match result {
                    Ok(()) => {
                        self.apply(StateChange::macro_state(name, state));
                        Ok(state)
                    }
                    Err(e) => Err(Error::from(e)),
                };
                let _ = reply.send(result);
            }
            UnitOutcome::Refreshed { fan_out, reply } => {
                self.refresh_in_flight = false;
                let at = Utc::now();
                self.last_refresh_at = Some(at);
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(RefreshReport {
                        snapshot: self.state.clone(),
                        requests_sent: fan_out.sent,
                        requests_failed: fan_out.failed,
                        at,
                    }));
                }
            }
        }
    }
}
