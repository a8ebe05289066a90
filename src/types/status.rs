// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub connectivity status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connectivity of the hub as last reported on its `status` topic.
///
/// A freshly started coordinator assumes [`RemoteStatus::Offline`] until the
/// hub says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// The hub announced itself online.
    Online,
    /// The hub is offline or has not been heard from.
    #[default]
    Offline,
    /// The hub published a status this library does not recognize.
    Unknown,
}

impl RemoteStatus {
    /// Maps a status payload to a status value.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Anything other than `online`/`offline` is [`RemoteStatus::Unknown`].
    #[must_use]
    pub fn from_payload(payload: &str) -> Self {
        let trimmed = payload.trim();
        if trimmed.eq_ignore_ascii_case("online") {
            Self::Online
        } else if trimmed.eq_ignore_ascii_case("offline") {
            Self::Offline
        } else {
            Self::Unknown
        }
    }

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
