// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Best-effort persistence of macro toggle states.
//!
//! The file holds `{"macro_states": {<name>: "on" | "off"}}` and is scoped
//! by remote identifier. Losing it only costs cross-restart durability, so
//! every failure is logged and swallowed by the callers in this crate.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::PersistenceError;
use crate::types::MacroState;

/// Macro name to toggle state.
pub type MacroStates = BTreeMap<String, MacroState>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    macro_states: MacroStates,
}

/// Location of the persisted macro states of one hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroStore {
    path: PathBuf,
}

impl MacroStore {
    /// Uses an explicit file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses the standard file name for `remote_id` inside `storage_dir`.
    #[must_use]
    pub fn for_remote(storage_dir: impl AsRef<Path>, remote_id: &str) -> Self {
        Self::new(storage_dir.as_ref().join(Self::file_name(remote_id)))
    }

    /// Returns `haptique_rs90_<remote_id>_states.json`, with path
    /// separators in the identifier replaced by `_`.
    #[must_use]
    pub fn file_name(remote_id: &str) -> String {
        let safe: String = remote_id
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("haptique_rs90_{safe}_states.json")
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted states.
    ///
    /// A missing, unreadable or corrupt file yields an empty map.
    #[must_use]
    pub fn load(&self) -> MacroStates {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No persisted macro states");
            return MacroStates::new();
        }

        match self.try_load() {
            Ok(states) => {
                tracing::info!(
                    path = %self.path.display(),
                    count = states.len(),
                    "Loaded persisted macro states"
                );
                states
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to load macro states");
                MacroStates::new()
            }
        }
    }

    fn try_load(&self) -> Result<MacroStates, PersistenceError> {
        let contents = fs::read_to_string(&self.path)?;
        let file: StateFile = serde_json::from_str(&contents)?;
        Ok(file.macro_states)
    }

    /// Writes the states, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the directory or file cannot be written.
    pub fn save(&self, macro_states: &MacroStates) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = StateFile {
            macro_states: macro_states.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, contents)?;

        tracing::debug!(
            path = %self.path.display(),
            count = macro_states.len(),
            "Saved macro states"
        );
        Ok(())
    }
}

/// Background writer for macro states.
///
/// Saves are requested by replacing the value in a `watch` channel; the
/// worker always writes the newest map, so a burst of requests collapses
/// into fewer writes and an older map never overwrites a newer one.
#[derive(Debug)]
pub struct PersistenceWorker {
    tx: watch::Sender<MacroStates>,
    handle: JoinHandle<()>,
}

impl PersistenceWorker {
    /// Spawns the worker. `current` is what is already on disk and is not
    /// written again.
    #[must_use]
    pub fn spawn(store: MacroStore, current: MacroStates) -> Self {
        let (tx, mut rx) = watch::channel(current);
        let handle = tokio::spawn(async move {
            // Yields every unseen value, including one sent right before close
            while rx.changed().await.is_ok() {
                let states = rx.borrow_and_update().clone();
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.save(&states)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Failed to persist macro states"),
                    Err(e) => tracing::error!(error = %e, "Macro state writer panicked"),
                }
            }
            tracing::debug!("Persistence worker stopped");
        });
        Self { tx, handle }
    }

    /// Requests a save of `states`.
    pub fn request(&self, states: MacroStates) {
        self.tx.send_replace(states);
    }

    /// Flushes the pending save and stops the worker.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Persistence worker failed");
        }
    }
}
