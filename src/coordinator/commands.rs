// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound commands.

use crate::error::{ProtocolError, ValueError};
use crate::protocol::{Qos, Topics, Transport};
use crate::types::MacroState;

/// What to write to a macro trigger topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MacroAction {
    /// Write this state.
    Set(MacroState),
    /// Write the negation of the last known local state.
    Toggle,
}

impl MacroAction {
    /// Resolves the state to publish given the last known local value.
    pub(crate) fn resolve(self, last: Option<MacroState>) -> MacroState {
        match self {
            Self::Set(state) => state,
            Self::Toggle => MacroState::toggle_from(last),
        }
    }
}

pub(crate) fn require_name(value: &str, what: &'static str) -> Result<(), ValueError> {
    if value.trim().is_empty() {
        return Err(ValueError::EmptyName(what));
    }
    Ok(())
}

/// Publishes a macro state, retained so it survives a broker restart.
pub(crate) async fn publish_macro<T: Transport>(
    transport: &T,
    topics: &Topics,
    name: &str,
    state: MacroState,
) -> Result<(), ProtocolError> {
    let topic = topics.macro_trigger(name);
    transport
        .publish(&topic, state.as_str(), Qos::AtLeastOnce, true)
        .await
        .inspect_err(|e| {
            tracing::error!(topic = %topic, state = %state.as_str(), error = %e, "Failed to trigger macro");
        })?;
    tracing::info!(name = %name, state = %state.as_str(), "Macro triggered");
    Ok(())
}

/// Publishes a device command, not retained.
pub(crate) async fn publish_device_command<T: Transport>(
    transport: &T,
    topics: &Topics,
    device: &str,
    command: &str,
) -> Result<(), ProtocolError> {
    let topic = topics.device_trigger(device);
    transport
        .publish(&topic, command, Qos::AtLeastOnce, false)
        .await
        .inspect_err(|e| {
            tracing::error!(topic = %topic, command = %command, error = %e, "Failed to send device command");
        })?;
    tracing::info!(device = %device, command = %command, "Device command sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MemoryTransport;

    #[test]
    fn toggle_resolves_against_last_state() {
        assert_eq!(MacroAction::Toggle.resolve(None), MacroState::On);
        assert_eq!(
            MacroAction::Toggle.resolve(Some(MacroState::On)),
            MacroState::Off
        );
        assert_eq!(
            MacroAction::Set(MacroState::Off).resolve(Some(MacroState::Off)),
            MacroState::Off
        );
    }

    #[test]
    fn empty_names_rejected() {
        assert_eq!(
            require_name("  ", "macro name"),
            Err(ValueError::EmptyName("macro name"))
        );
        assert!(require_name("Watch TV", "macro name").is_ok());
    }

    #[tokio::test]
    async fn macro_publish_is_retained() {
        let transport = MemoryTransport::new();
        let topics = Topics::new("h", "r");
        publish_macro(&transport, &topics, "X", MacroState::On)
            .await
            .unwrap();

        let published = transport.published_to("h/r/macro/X/trigger");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload, "on");
        assert!(published[0].retain);
    }

    #[tokio::test]
    async fn device_command_is_not_retained() {
        let transport = MemoryTransport::new();
        let topics = Topics::new("h", "r");
        publish_device_command(&transport, &topics, "TV", "Power")
            .await
            .unwrap();

        let published = transport.published_to("h/r/device/TV/trigger");
        assert_eq!(published[0].payload, "Power");
        assert!(!published[0].retain);
    }
}
