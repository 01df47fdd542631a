// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport adapters for publishing devices on a message bus.
//!
//! A [`Device`](crate::Device) talks to the bus only through the
//! [`Transport`] trait: connect, publish, subscribe, unsubscribe and
//! disconnect. It never looks at transport internals beyond the success or
//! failure of each call.
//!
//! # Implementations
//!
//! - [`MqttTransport`]: MQTT 3.1.1 through `rumqttc` (feature `mqtt`)
//! - [`MemoryTransport`]: in-process client of a [`MemoryBroker`], with
//!   retained messages and failure injection

mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use memory::{MemoryBroker, MemoryTransport, Message, PUBLISHED_LOG_CAPACITY};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Configuration, Credentials};
use crate::error::TransportError;

/// Future returned by [`Transport`] operations.
pub type TransportFuture<'a, T = ()> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Handler invoked by a transport for every message on a subscribed topic.
///
/// Arguments are the topic and the raw payload. Handlers run on the
/// transport's delivery context and must not block.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Message the broker publishes on behalf of a client that drops off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    /// Topic of the will message.
    pub topic: String,
    /// Payload of the will message.
    pub payload: String,
    /// Whether the will message is retained.
    pub retained: bool,
}

/// Options for [`Transport::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Broker endpoint, e.g. `mqtt://192.168.1.50:1883`.
    pub endpoint: String,
    /// Client id; transports generate one when `None`.
    pub client_id: Option<String>,
    /// Broker credentials.
    pub credentials: Option<Credentials>,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// How long to wait for the broker to accept the connection.
    pub connection_timeout: Duration,
    /// Will message registered with the broker.
    pub last_will: Option<LastWill>,
}

impl ConnectOptions {
    /// Creates connect options from a device configuration.
    #[must_use]
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            endpoint: config.broker_url().to_string(),
            client_id: None,
            credentials: config.credentials().cloned(),
            keep_alive: config.keep_alive(),
            connection_timeout: config.connection_timeout(),
            last_will: None,
        }
    }

    /// Sets the will message.
    #[must_use]
    pub fn with_last_will(mut self, will: LastWill) -> Self {
        self.last_will = Some(will);
        self
    }
}

/// Publish/subscribe capability consumed by a device.
///
/// The trait is object safe; devices hold an `Arc<dyn Transport>`.
/// Operations return boxed `Send` futures so the lifecycle sequence can run
/// on a spawned task.
///
/// A `subscribe` future resolves only once the subscription is active, and
/// retained messages on the topic may be delivered to the handler right
/// after.
pub trait Transport: Send + Sync {
    /// Establishes the connection.
    fn connect<'a>(&'a self, options: &'a ConnectOptions) -> TransportFuture<'a>;

    /// Publishes `payload` on `topic`.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        retained: bool,
    ) -> TransportFuture<'a>;

    /// Subscribes to `topic`, routing its messages to `handler`.
    fn subscribe<'a>(&'a self, topic: &'a str, handler: MessageHandler) -> TransportFuture<'a>;

    /// Cancels a subscription.
    fn unsubscribe<'a>(&'a self, topic: &'a str) -> TransportFuture<'a>;

    /// Closes the connection.
    fn disconnect(&self) -> TransportFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transports_are_object_safe() {
        fn assert_dyn(_: Arc<dyn Transport>) {}
        assert_dyn(Arc::new(MemoryBroker::new().transport()));
    }

    #[test]
    fn connect_options_from_config() {
        let config = Configuration::builder()
            .broker_url("mqtt://broker:1883")
            .device_id("dev")
            .credentials("user", "pass")
            .keep_alive(Duration::from_secs(45))
            .build()
            .unwrap();

        let options = ConnectOptions::from_config(&config).with_last_will(LastWill {
            topic: "homie/dev/$state".to_string(),
            payload: "lost".to_string(),
            retained: true,
        });

        assert_eq!(options.endpoint, "mqtt://broker:1883");
        assert_eq!(options.keep_alive, Duration::from_secs(45));
        assert_eq!(options.credentials.unwrap().username, "user");
        assert_eq!(options.last_will.unwrap().payload, "lost");
    }
}
