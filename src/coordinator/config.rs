// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coordinator configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ValueError;
use crate::persistence::MacroStore;
use crate::protocol::Topics;

/// Default root of the topic namespace.
pub const DEFAULT_BASE_TOPIC: &str = "haptique";

/// Default period of the refresh tick.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Default directory of the persisted macro states.
pub const DEFAULT_STORAGE_DIR: &str = ".storage";

/// Default capacity of the request and inbound channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration of one coordinator.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use haptique_rs90::coordinator::CoordinatorConfig;
///
/// let config = CoordinatorConfig::new("rs90-01")
///     .with_base_topic("home/haptique")
///     .with_refresh_interval(Duration::from_secs(60))
///     .with_storage_dir("/var/lib/bridge");
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.topics().status(), "home/haptique/rs90-01/status");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Stable identifier of the hub.
    pub remote_id: String,
    /// Root of the topic namespace.
    pub base_topic: String,
    /// Period of the refresh tick.
    pub refresh_interval: Duration,
    /// Directory holding the persisted macro states.
    pub storage_dir: PathBuf,
    /// Capacity of the request and inbound channels.
    pub channel_capacity: usize,
}

impl CoordinatorConfig {
    /// Creates a configuration with defaults for everything but the hub id.
    #[must_use]
    pub fn new(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            base_topic: DEFAULT_BASE_TOPIC.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets the root of the topic namespace.
    #[must_use]
    pub fn with_base_topic(mut self, base_topic: impl Into<String>) -> Self {
        self.base_topic = base_topic.into();
        self
    }

    /// Sets the refresh period.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Sets the storage directory.
    #[must_use]
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Sets the channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ValueError` for an empty remote id or base topic, a zero
    /// refresh interval, or a zero channel capacity.
    pub fn validate(&self) -> Result<(), ValueError> {
        if self.remote_id.trim().is_empty() {
            return Err(ValueError::EmptyName("remote id"));
        }
        if self.base_topic.trim_end_matches('/').is_empty() {
            return Err(ValueError::EmptyName("base topic"));
        }
        if self.refresh_interval.is_zero() {
            return Err(ValueError::InvalidConfig(
                "refresh interval must be greater than zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ValueError::InvalidConfig(
                "channel capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the topic namespace of the hub.
    #[must_use]
    pub fn topics(&self) -> Topics {
        Topics::new(&self.base_topic, &self.remote_id)
    }

    /// Returns the persisted state location of the hub.
    #[must_use]
    pub fn store(&self) -> MacroStore {
        MacroStore::for_remote(&self.storage_dir, &self.remote_id)
    }
}
