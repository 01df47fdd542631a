// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `homie_device` library.
//!
//! Configuration and `send()` errors are returned synchronously. Failures
//! that happen inside a lifecycle sequence or a set-callback never reach the
//! caller directly; they are reported through
//! [`DeviceEvent`](crate::event::DeviceEvent)s instead.

use thiserror::Error;

use crate::types::DataType;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// An identifier does not satisfy the topic ID grammar.
    #[error("invalid topic identifier: {0:?}")]
    InvalidIdentifier(String),

    /// An identifier is already used within its parent scope.
    #[error("duplicate identifier {id:?} in {scope}")]
    DuplicateIdentifier {
        /// The scope the collision happened in (device or node id).
        scope: String,
        /// The colliding identifier.
        id: String,
    },

    /// A lifecycle call is not valid right now.
    #[error("lifecycle conflict: {0}")]
    Lifecycle(#[from] LifecycleConflict),

    /// A value does not match the declared data type of a property.
    #[error("type mismatch: property expects {expected}, got {actual}")]
    TypeMismatch {
        /// The declared data type.
        expected: DataType,
        /// The data type of the rejected value.
        actual: DataType,
    },

    /// A value is not one of the options of an enum property.
    #[error("value {value:?} is not one of the enum options [{options}]")]
    InvalidEnumValue {
        /// The rejected value.
        value: String,
        /// The allowed options, comma separated.
        options: String,
    },

    /// A value lies outside the format declared on its property.
    #[error("value {value} is outside the property format {format:?}")]
    OutsideFormat {
        /// The rejected value, in its payload form.
        value: String,
        /// The declared format, in its published form.
        format: String,
    },

    /// A format does not apply to the declared data type.
    #[error("format {format:?} does not apply to {data_type} properties")]
    InvalidFormat {
        /// The declared data type.
        data_type: DataType,
        /// The rejected format, in its published form.
        format: String,
    },

    /// A value could not be parsed.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A lifecycle call was made outside of a Tokio runtime.
    #[error("no Tokio runtime available to run the lifecycle sequence")]
    NoRuntime,
}

/// Reasons a lifecycle or tree operation is rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleConflict {
    /// `setup()` was called while the device is already up.
    #[error("device is already active")]
    AlreadyActive,

    /// Another lifecycle sequence is in flight.
    #[error("lifecycle busy")]
    Busy,

    /// `shutdown()` was called on a device that is not active.
    #[error("device is not active")]
    NotActive,

    /// The node/property tree can no longer be changed.
    #[error("device tree is frozen outside of the init state")]
    TreeFrozen,
}

/// Errors raised when parsing property values from their text form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Text is not a valid integer.
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Text is not a valid float.
    #[error("invalid float: {0:?}")]
    InvalidFloat(String),

    /// A float is NaN or infinite and has no payload form.
    #[error("float is not finite: {0}")]
    NotFinite(String),

    /// Text is neither `true` nor `false`.
    #[error("invalid boolean: {0:?}")]
    InvalidBoolean(String),

    /// Text is not a valid color triple.
    #[error("invalid color: {0:?}")]
    InvalidColor(String),

    /// A color component is outside its range.
    #[error("color component {actual} is out of range [0, {max}]")]
    OutOfRange {
        /// Maximum allowed value.
        max: u16,
        /// The actual value that was provided.
        actual: u16,
    },
}

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
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

    /// The transport is not connected.
    #[error("transport is not connected")]
    NotConnected,

    /// The broker refused a subscription.
    #[error("subscription to {0} rejected")]
    SubscribeRejected(String),

    /// The broker refused a publish.
    #[error("publish to {0} rejected")]
    PublishRejected(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
