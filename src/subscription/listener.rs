// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Change listeners.
//!
//! - [`ListenerId`] - Handle returned on registration, used to remove a listener
//! - [`ListenerRegistry`] - Stores listeners and notifies them of applied changes

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::state::{RemoteState, StateChange};
use crate::types::{MacroState, RemoteStatus};

/// Unique identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

type ChangeListener = Arc<dyn Fn(&StateChange, &RemoteState) + Send + Sync>;

/// Registry of change listeners.
///
/// Listeners run synchronously on the coordinator's dispatch task, after the
/// change was applied, in registration order. They see the new snapshot and
/// must not block.
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<ListenerId, ChangeListener>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().insert(id, listener);
        id
    }

    /// Registers a listener for every applied change.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateChange, &RemoteState) + Send + Sync + 'static,
    {
        self.insert(Arc::new(listener))
    }

    /// Registers a listener for macro toggle state changes.
    ///
    /// Purged macros are not reported.
    pub fn on_macro_state<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str, MacroState) + Send + Sync + 'static,
    {
        self.insert(Arc::new(move |change, _| {
            if let StateChange::MacroState { name, state } = change {
                listener(name, *state);
            }
        }))
    }

    /// Registers a listener for hub connectivity changes.
    pub fn on_status<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(RemoteStatus) + Send + Sync + 'static,
    {
        self.insert(Arc::new(move |change, _| {
            if let StateChange::Status(status) = change {
                listener(*status);
            }
        }))
    }

    /// Removes a listener.
    ///
    /// Returns `true` if it was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Notifies every listener of an applied change.
    pub fn notify(&self, change: &StateChange, state: &RemoteState) {
        // Snapshot so a listener may register or remove listeners
        let mut listeners: Vec<(ListenerId, ChangeListener)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();
        listeners.sort_by_key(|(id, _)| *id);

        for (_, listener) in listeners {
            listener(change, state);
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
