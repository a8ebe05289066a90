// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub state management types.
//!
//! [`RemoteState`] is the single in-memory source of truth for one hub.
//! [`StateChange`] represents individual changes that can be applied to it.
//!
//! # Examples
//!
//! ```
//! use haptique_rs90::state::{RemoteState, StateChange};
//! use haptique_rs90::types::RemoteStatus;
//!
//! let mut state = RemoteState::new();
//! state.apply(&StateChange::Status(RemoteStatus::Online));
//! assert_eq!(state.status, RemoteStatus::Online);
//! ```

mod remote_state;
mod state_change;

pub use remote_state::RemoteState;
pub use state_change::StateChange;
