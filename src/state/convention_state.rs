// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Published `$state` values.

use std::fmt;

/// Value of the retained `$state` device attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConventionState {
    /// The device is publishing its description.
    Init,
    /// The description is complete and commands are accepted.
    Ready,
    /// The device disconnected cleanly.
    Disconnected,
    /// The connection dropped; published by the broker as last will.
    Lost,
}

impl ConventionState {
    /// Returns the `$state` payload.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for ConventionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
