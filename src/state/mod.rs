// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state types.
//!
//! Two related but distinct state notions exist:
//!
//! - [`DeviceState`] is the local lifecycle state machine driven by
//!   [`Device::setup`](crate::Device::setup) and
//!   [`Device::shutdown`](crate::Device::shutdown).
//! - [`ConventionState`] is the value published on the retained
//!   `<root>/<device>/$state` topic for observers on the bus.
//!
//! # Examples
//!
//! ```
//! use homie_device::state::{ConventionState, DeviceState};
//!
//! let state = DeviceState::Init;
//! assert!(state.is_terminal());
//! assert_eq!(state.next(), DeviceState::Connecting);
//!
//! assert_eq!(ConventionState::Ready.as_str(), "ready");
//! ```

mod convention_state;
mod device_state;

pub use convention_state::ConventionState;
pub use device_state::DeviceState;
