// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle state of a device.

use std::fmt;

/// Lifecycle state of a [`Device`](crate::Device).
///
/// States only advance along the cycle
/// `Init → Connecting → Ready → Disconnecting → Init`, except that a failed
/// `Connecting` sequence falls back to `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    /// Not connected; the node/property tree may be changed.
    #[default]
    Init,
    /// Connecting and publishing the device description.
    Connecting,
    /// Fully published with active `set` subscriptions.
    Ready,
    /// Unpublishing and disconnecting.
    Disconnecting,
}

impl DeviceState {
    /// Returns the state that follows this one on the lifecycle cycle.
    #[must_use]
    pub const fn next(&self) -> Self {
        match self {
            Self::Init => Self::Connecting,
            Self::Connecting => Self::Ready,
            Self::Ready => Self::Disconnecting,
            Self::Disconnecting => Self::Init,
        }
    }

    /// Returns `true` if no lifecycle sequence is in flight.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Init | Self::Ready)
    }

    /// Returns the lowercase name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_returns_to_init() {
        let mut state = DeviceState::default();
        for _ in 0..4 {
            state = state.next();
        }
        assert_eq!(state, DeviceState::Init);
    }

    #[test]
    fn in_flight_states_are_not_terminal() {
        assert!(!DeviceState::Connecting.is_terminal());
        assert!(!DeviceState::Disconnecting.is_terminal());
        assert!(DeviceState::Ready.is_terminal());
    }
}
