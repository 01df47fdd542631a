// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event types.

use std::fmt;

use crate::state::DeviceState;

/// The lifecycle sequence an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOperation {
    /// The `setup()` sequence.
    Setup,
    /// The `shutdown()` sequence.
    Shutdown,
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Events emitted by a device.
///
/// All events carry the id of the device that emitted them, so one
/// receiver can serve several devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The lifecycle state changed.
    StateChanged {
        /// The device id.
        device_id: String,
        /// The previous state.
        from: DeviceState,
        /// The new state.
        to: DeviceState,
    },

    /// A step of a lifecycle sequence failed.
    ///
    /// A failed setup aborts and falls back to `Init`; a failed shutdown
    /// step is skipped and the sequence continues.
    LifecycleFailed {
        /// The device id.
        device_id: String,
        /// The sequence that failed.
        operation: LifecycleOperation,
        /// Description of the failure.
        error: String,
    },

    /// A set-callback returned an error or panicked.
    CallbackFailed {
        /// The device id.
        device_id: String,
        /// The `set` topic the command arrived on.
        topic: String,
        /// Description of the failure.
        error: String,
    },

    /// An inbound message could not be dispatched.
    InvalidMessage {
        /// The device id.
        device_id: String,
        /// The topic the message arrived on.
        topic: String,
        /// Why it was dropped.
        reason: String,
    },
}

impl DeviceEvent {
    /// Returns the device id associated with this event.
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::StateChanged { device_id, .. }
            | Self::LifecycleFailed { device_id, .. }
            | Self::CallbackFailed { device_id, .. }
            | Self::InvalidMessage { device_id, .. } => device_id,
        }
    }

    /// Returns `true` if this is a state change event.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(self, Self::StateChanged { .. })
    }

    /// Returns `true` if this event reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.is_state_change()
    }

    /// Creates a state changed event.
    #[must_use]
    pub fn state_changed(device_id: impl Into<String>, from: DeviceState, to: DeviceState) -> Self {
        Self::StateChanged {
            device_id: device_id.into(),
            from,
            to,
        }
    }

    /// Creates a lifecycle failure event.
    #[must_use]
    pub fn lifecycle_failed(
        device_id: impl Into<String>,
        operation: LifecycleOperation,
        error: impl fmt::Display,
    ) -> Self {
        Self::LifecycleFailed {
            device_id: device_id.into(),
            operation,
            error: error.to_string(),
        }
    }

    /// Creates a callback failure event.
    #[must_use]
    pub fn callback_failed(
        device_id: impl Into<String>,
        topic: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::CallbackFailed {
            device_id: device_id.into(),
            topic: topic.into(),
            error: error.into(),
        }
    }

    /// Creates an invalid message event.
    #[must_use]
    pub fn invalid_message(
        device_id: impl Into<String>,
        topic: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidMessage {
            device_id: device_id.into(),
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn device_id_extraction() {
        let event = DeviceEvent::callback_failed("lamp", "homie/lamp/light/on/set", "boom");
        assert_eq!(event.device_id(), "lamp");

        let event = DeviceEvent::state_changed("fan", DeviceState::Ready, DeviceState::Disconnecting);
        assert_eq!(event.device_id(), "fan");
    }

    #[test]
    fn error_classification() {
        assert!(!DeviceEvent::state_changed("d", DeviceState::Init, DeviceState::Connecting).is_error());
        assert!(DeviceEvent::invalid_message("d", "t", "not utf-8").is_error());
    }

    #[test]
    fn lifecycle_failed_formats_error() {
        let event = DeviceEvent::lifecycle_failed(
            "lamp",
            LifecycleOperation::Setup,
            TransportError::NotConnected,
        );
        if let DeviceEvent::LifecycleFailed {
            operation, error, ..
        } = event
        {
            assert_eq!(operation, LifecycleOperation::Setup);
            assert_eq!(error, "transport is not connected");
        } else {
            panic!("Expected LifecycleFailed event");
        }
    }
}
