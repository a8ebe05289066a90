// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! The hierarchy mirrors the failure classes of the coordinator: value
//! validation, transport communication, payload parsing, and persistence.
//! None of them is fatal to a running coordinator; they are either logged
//! and swallowed or returned to the caller of a single operation.

use thiserror::Error;

use crate::state::RemoteState;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during transport communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred while reading or writing persisted state.
    ///
    /// The coordinator only logs persistence failures. This variant lets
    /// callers driving a [`MacroStore`](crate::persistence::MacroStore)
    /// directly propagate `save` errors with `?`.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The coordinator's dispatch task is no longer running.
    #[error("coordinator is stopped")]
    Stopped,

    /// A refresh tick could not be executed.
    ///
    /// The last known snapshot is still returned to the caller.
    #[error("refresh failed: {reason}")]
    Refresh {
        /// Why the tick did not run.
        reason: String,
        /// The last snapshot observed before the failure.
        snapshot: Box<RemoteState>,
    },
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u16,
        /// Maximum allowed value.
        max: u16,
        /// The actual value that was provided.
        actual: u16,
    },

    /// An invalid macro state string was provided.
    #[error("invalid macro state: {0}")]
    InvalidMacroState(String),

    /// A required name was empty.
    #[error("{0} must not be empty")]
    EmptyName(&'static str),

    /// A configuration value is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors related to transport communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The transport refused a subscription.
    #[error("subscribe to {topic} failed: {reason}")]
    SubscribeFailed {
        /// The topic that could not be subscribed.
        topic: String,
        /// Transport-specific reason.
        reason: String,
    },

    /// The transport refused a publish.
    #[error("publish to {topic} failed: {reason}")]
    PublishFailed {
        /// The topic that could not be published to.
        topic: String,
        /// Transport-specific reason.
        reason: String,
    },
}

/// Errors related to parsing hub payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected payload format.
    #[error("unexpected payload format: {0}")]
    UnexpectedFormat(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

/// Errors related to the persisted macro state file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// File system access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
