// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The hub coordinator.
//!
//! [`Coordinator::start`] loads the persisted macro states, subscribes the
//! fixed topics of the hub, asks for a first battery reading and spawns a
//! single dispatch task that owns all state from then on. The returned
//! [`Coordinator`] is a cheap handle: every operation is a message to that
//! task, and snapshots are read from a `watch` channel without a round trip.
//!
//! # Examples
//!
//! ```no_run
//! use haptique_rs90::coordinator::{Coordinator, CoordinatorConfig};
//! use haptique_rs90::protocol::MqttTransport;
//! use haptique_rs90::types::MacroState;
//!
//! #[tokio::main]
//! async fn main() -> haptique_rs90::Result<()> {
//!     let transport = MqttTransport::builder()
//!         .host("192.168.1.50")
//!         .build()
//!         .await?;
//!
//!     let coordinator =
//!         Coordinator::start(transport, CoordinatorConfig::new("rs90-01")).await?;
//!
//!     coordinator.trigger_macro("Watch TV", MacroState::On).await?;
//!     coordinator.trigger_device_command("TV", "Power").await?;
//!
//!     let snapshot = coordinator.snapshot();
//!     println!("battery: {:?}", snapshot.battery_level);
//!
//!     coordinator.shutdown().await
//! }
//! ```

mod commands;
mod config;
mod diagnostics;
mod dispatch;
mod refresh;

pub use config::{
    CoordinatorConfig, DEFAULT_BASE_TOPIC, DEFAULT_CHANNEL_CAPACITY, DEFAULT_REFRESH_INTERVAL,
    DEFAULT_STORAGE_DIR,
};
pub use diagnostics::Diagnostics;
pub use refresh::RefreshReport;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{Error, Result};
use crate::persistence::{MacroStates, PersistenceWorker};
use crate::protocol::Transport;
use crate::state::{RemoteState, StateChange};
use crate::subscription::{ListenerId, ListenerRegistry, SubscriptionManager};
use crate::types::{MacroState, RemoteStatus};

use commands::MacroAction;
use dispatch::{Dispatcher, Request};

/// Handle to a running coordinator.
///
/// Cloning is cheap. When the last handle is dropped the dispatch task
/// shuts down as if [`Coordinator::shutdown`] had been called.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    remote_id: String,
    requests: mpsc::Sender<Request>,
    state_rx: watch::Receiver<RemoteState>,
    listeners: Arc<ListenerRegistry>,
}

impl Coordinator {
    /// Starts a coordinator on `transport`.
    ///
    /// Subscription failures of the fixed topics are logged and do not fail
    /// the start.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` if the configuration is invalid.
    pub async fn start<T: Transport>(transport: T, config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;

        let store = config.store();
        let load_store = store.clone();
        let macro_states = tokio::task::spawn_blocking(move || load_store.load())
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Loading macro states panicked");
                MacroStates::new()
            });

        let state = RemoteState::with_macro_states(macro_states.clone());
        let (state_tx, state_rx) = watch::channel(state.clone());
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);

        let topics = config.topics();
        let transport = Arc::new(transport);
        let subscriptions = Arc::new(SubscriptionManager::new(Arc::clone(&transport), inbound_tx));

        let mut failed = 0usize;
        for (topic, route) in topics.fixed_subscriptions() {
            if subscriptions.subscribe(&topic, route).await.is_err() {
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::warn!(failed, "Some hub topics could not be subscribed");
        }

        refresh::request_battery(transport.as_ref(), &topics).await;

        let listeners = Arc::new(ListenerRegistry::new());
        let persistence = PersistenceWorker::spawn(store, macro_states);
        let dispatcher = Dispatcher::new(
            config.remote_id.clone(),
            topics,
            state,
            subscriptions,
            Arc::clone(&listeners),
            state_tx,
            persistence,
            Utc::now(),
        );
        tokio::spawn(dispatcher.run(request_rx, inbound_rx, config.refresh_interval));

        tracing::info!(
            remote_id = %config.remote_id,
            base_topic = %config.base_topic,
            refresh_interval = ?config.refresh_interval,
            "Coordinator started"
        );

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                remote_id: config.remote_id,
                requests: request_tx,
                state_rx,
                listeners,
            }),
        })
    }

    /// Returns the hub identifier.
    #[must_use]
    pub fn remote_id(&self) -> &str {
        &self.inner.remote_id
    }

    /// Returns `true` until the dispatch task has stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.requests.is_closed()
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> RemoteState {
        self.inner.state_rx.borrow().clone()
    }

    /// Returns a receiver that is updated after every applied change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RemoteState> {
        self.inner.state_rx.clone()
    }

    /// Registers a listener called after every applied change.
    ///
    /// Listeners run on the dispatch task and must not block.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateChange, &RemoteState) + Send + Sync + 'static,
    {
        self.inner.listeners.on_change(listener)
    }

    /// Registers a listener for macro toggle state changes.
    pub fn on_macro_state<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str, MacroState) + Send + Sync + 'static,
    {
        self.inner.listeners.on_macro_state(listener)
    }

    /// Registers a listener for hub connectivity changes.
    pub fn on_status<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(RemoteStatus) + Send + Sync + 'static,
    {
        self.inner.listeners.on_status(listener)
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Request) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .requests
            .send(make(reply))
            .await
            .map_err(|_| Error::Stopped)?;
        rx.await.map_err(|_| Error::Stopped)
    }

    /// Publishes `state` to the macro's trigger topic (retained), then
    /// records it locally, persists it and notifies listeners.
    ///
    /// No acknowledgement from the hub is awaited.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` for an empty name, `Error::Protocol` if the
    /// transport rejects the publish (local state is left untouched), and
    /// `Error::Stopped` after shutdown.
    pub async fn trigger_macro(&self, name: &str, state: MacroState) -> Result<()> {
        commands::require_name(name, "macro name")?;
        let name = name.to_string();
        self.request(|reply| Request::TriggerMacro {
            name,
            action: MacroAction::Set(state),
            reply,
        })
        .await?
        .map(|_| ())
    }

    /// Triggers the negation of the macro's last known local state
    /// (`on` when unknown) and returns the state written.
    ///
    /// The physical state is never queried, so this can diverge from the
    /// device if it is changed out of band.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::trigger_macro`].
    pub async fn toggle_macro(&self, name: &str) -> Result<MacroState> {
        commands::require_name(name, "macro name")?;
        let name = name.to_string();
        self.request(|reply| Request::TriggerMacro {
            name,
            action: MacroAction::Toggle,
            reply,
        })
        .await?
    }

    /// Publishes a command name to a device's trigger topic, not retained.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` for an empty device or command name,
    /// `Error::Protocol` if the transport rejects the publish, and
    /// `Error::Stopped` after shutdown.
    pub async fn trigger_device_command(&self, device: &str, command: &str) -> Result<()> {
        commands::require_name(device, "device name")?;
        commands::require_name(command, "command name")?;
        let device = device.to_string();
        let command = command.to_string();
        self.request(|reply| Request::TriggerDeviceCommand {
            device,
            command,
            reply,
        })
        .await?
    }

    /// Runs a refresh tick now.
    ///
    /// # Errors
    ///
    /// Returns `Error::Refresh` carrying the last known snapshot if the
    /// coordinator has stopped.
    pub async fn force_refresh(&self) -> Result<RefreshReport> {
        match self.request(|reply| Request::ForceRefresh { reply }).await {
            Ok(report) => report,
            Err(_) => Err(Error::Refresh {
                reason: "coordinator is stopped".to_string(),
                snapshot: Box::new(self.snapshot()),
            }),
        }
    }

    /// Returns counts and raw lists for operator inspection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stopped` after shutdown.
    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        self.request(|reply| Request::Diagnostics { reply }).await
    }

    /// Stops the coordinator.
    ///
    /// In-flight background units are aborted, every subscription is
    /// detached, the refresh tick stops and pending macro states are
    /// flushed to disk. Persisted state is kept for the next start.
    /// Calling it again, from any handle, is a no-op.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` keeps the signature uniform.
    pub async fn shutdown(&self) -> Result<()> {
        if self.request(|reply| Request::Shutdown { reply }).await.is_err() {
            tracing::debug!(remote_id = %self.inner.remote_id, "Coordinator already stopped");
        }

        // The dispatch task drops its state sender as its very last step
        let mut state_rx = self.inner.state_rx.clone();
        while state_rx.changed().await.is_ok() {}
        Ok(())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("remote_id", &self.inner.remote_id)
            .field("running", &self.is_running())
            .field("listeners", &self.inner.listeners.len())
            .finish_non_exhaustive()
    }
}
