// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process broker and transport.
//!
//! [`MemoryBroker`] keeps retained messages and routes publishes to
//! subscribers with MQTT wildcard matching. Devices connect to it through a
//! [`MemoryTransport`]; tests and tools watch the bus with
//! [`MemoryBroker::observe`] and inject commands with
//! [`MemoryBroker::publish`].
//!
//! Delivery is synchronous: handlers run on the publisher's context, after
//! the broker lock is released.
//!
//! # Examples
//!
//! ```
//! use homie_device::transport::{MemoryBroker, Transport, ConnectOptions};
//! use homie_device::Configuration;
//!
//! # async fn example() -> Result<(), homie_device::Error> {
//! let broker = MemoryBroker::new();
//! let transport = broker.transport();
//!
//! let config = Configuration::new("memory", "dev", "Dev")?;
//! transport.connect(&ConnectOptions::from_config(&config)).await?;
//! transport.publish("homie/dev/$name", "Dev", true).await?;
//!
//! assert_eq!(broker.retained("homie/dev/$name").as_deref(), Some("Dev"));
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::topic;

use super::{ConnectOptions, LastWill, MessageHandler, Transport, TransportFuture};

/// Client id used for subscriptions made through [`MemoryBroker::observe`].
const OBSERVER_CLIENT: u64 = 0;

/// Number of messages kept for [`MemoryBroker::published`].
pub const PUBLISHED_LOG_CAPACITY: usize = 1024;

/// A message seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message was published on.
    pub topic: String,
    /// Payload as text.
    pub payload: String,
    /// Whether the message was published retained.
    pub retained: bool,
}

enum Sink {
    Handler(MessageHandler),
    Observer(mpsc::UnboundedSender<Message>),
}

impl Sink {
    fn deliver(&self, message: &Message) {
        match self {
            Self::Handler(handler) => handler(&message.topic, message.payload.as_bytes()),
            Self::Observer(tx) => {
                // Dropped observers are pruned on the next publish
                let _ = tx.send(message.clone());
            }
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self, Self::Observer(tx) if tx.is_closed())
    }
}

struct Subscription {
    client: u64,
    filter: String,
    sink: Arc<Sink>,
}

#[derive(Default)]
struct BrokerState {
    retained: IndexMap<String, String>,
    subscriptions: Vec<Subscription>,
    log: VecDeque<Message>,
    unreachable: bool,
    failing_publishes: Vec<String>,
    failing_subscribes: Vec<String>,
    wills: HashMap<u64, LastWill>,
}

/// An in-process publish/subscribe broker.
///
/// Cloning is cheap; clones share the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    next_client: Arc<AtomicU64>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new, not yet connected, client of this broker.
    #[must_use]
    pub fn transport(&self) -> MemoryTransport {
        // Client ids start at 1; 0 is reserved for observers
        let client = self.next_client.fetch_add(1, Ordering::Relaxed) + 1;
        MemoryTransport {
            broker: self.clone(),
            client,
            connected: AtomicBool::new(false),
        }
    }

    /// Publishes a message as an external client would.
    pub fn publish(&self, topic: &str, payload: &str, retained: bool) {
        self.route(Message {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retained,
        });
    }

    /// Subscribes an observer to `filter`.
    ///
    /// Retained messages matching the filter are queued first, like a late
    /// joining MQTT subscriber would see them.
    #[must_use]
    pub fn observe(&self, filter: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Sink::Observer(tx));
        let retained = self.subscribe_sink(OBSERVER_CLIENT, filter, Arc::clone(&sink));
        for message in &retained {
            sink.deliver(message);
        }
        rx
    }

    /// Returns the retained payload of `topic`.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<String> {
        self.state.lock().retained.get(topic).cloned()
    }

    /// Returns the messages published so far, in order.
    ///
    /// Only the last [`PUBLISHED_LOG_CAPACITY`] messages are kept.
    #[must_use]
    pub fn published(&self) -> Vec<Message> {
        self.state.lock().log.iter().cloned().collect()
    }

    /// Returns the topics of [`published`](Self::published), in order.
    #[must_use]
    pub fn published_topics(&self) -> Vec<String> {
        self.state.lock().log.iter().map(|m| m.topic.clone()).collect()
    }

    /// Returns the number of client subscriptions, observers excluded.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.client != OBSERVER_CLIENT)
            .count()
    }

    /// Makes connection attempts fail (`false`) or succeed (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    /// Makes client publishes on topics matching `filter` fail.
    pub fn fail_publish_on(&self, filter: impl Into<String>) {
        self.state.lock().failing_publishes.push(filter.into());
    }

    /// Makes client subscriptions to filters matching `filter` fail.
    pub fn fail_subscribe_on(&self, filter: impl Into<String>) {
        self.state.lock().failing_subscribes.push(filter.into());
    }

    /// Removes every failure injected with [`fail_publish_on`](Self::fail_publish_on)
    /// or [`fail_subscribe_on`](Self::fail_subscribe_on).
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_publishes.clear();
        state.failing_subscribes.clear();
    }

    fn subscribe_sink(&self, client: u64, filter: &str, sink: Arc<Sink>) -> Vec<Message> {
        let mut state = self.state.lock();
        state.subscriptions.push(Subscription {
            client,
            filter: filter.to_string(),
            sink,
        });
        state
            .retained
            .iter()
            .filter(|(topic, _)| topic::matches(filter, topic))
            .map(|(topic, payload)| Message {
                topic: topic.clone(),
                payload: payload.clone(),
                retained: true,
            })
            .collect()
    }

    fn route(&self, message: Message) {
        let sinks: Vec<Arc<Sink>> = {
            let mut state = self.state.lock();
            if state.log.len() == PUBLISHED_LOG_CAPACITY {
                state.log.pop_front();
            }
            state.log.push_back(message.clone());
            if message.retained {
                if message.payload.is_empty() {
                    state.retained.shift_remove(&message.topic);
                } else {
                    state
                        .retained
                        .insert(message.topic.clone(), message.payload.clone());
                }
            }
            state.subscriptions.retain(|s| !s.sink.is_closed());
            state
                .subscriptions
                .iter()
                .filter(|s| topic::matches(&s.filter, &message.topic))
                .map(|s| Arc::clone(&s.sink))
                .collect()
        };

        tracing::trace!(topic = %message.topic, receivers = sinks.len(), "Routing in-memory message");
        for sink in sinks {
            sink.deliver(&message);
        }
    }

    fn publish_fails(&self, topic_name: &str) -> bool {
        self.state
            .lock()
            .failing_publishes
            .iter()
            .any(|filter| topic::matches(filter, topic_name))
    }

    fn subscribe_fails(&self, subscription: &str) -> bool {
        self.state
            .lock()
            .failing_subscribes
            .iter()
            .any(|filter| topic::matches(filter, subscription))
    }

    fn release_client(&self, client: u64) -> Option<LastWill> {
        let mut state = self.state.lock();
        state.subscriptions.retain(|s| s.client != client);
        state.wills.remove(&client)
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBroker")
            .field("retained", &state.retained.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("reachable", &!state.unreachable)
            .finish()
    }
}

/// A client connection to a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    client: u64,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// Returns whether the transport is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Drops the connection without a clean disconnect.
    ///
    /// The broker removes the client's subscriptions and publishes its last
    /// will, if one was registered.
    pub fn simulate_connection_loss(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(client = self.client, "Simulating connection loss");
        if let Some(will) = self.broker.release_client(self.client) {
            self.broker.publish(&will.topic, &will.payload, will.retained);
        }
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl Transport for MemoryTransport {
    fn connect<'a>(&'a self, options: &'a ConnectOptions) -> TransportFuture<'a> {
        Box::pin(async move {
            let mut state = self.broker.state.lock();
            if state.unreachable {
                return Err(TransportError::ConnectionFailed(format!(
                    "{} is unreachable",
                    options.endpoint
                )));
            }
            if let Some(will) = &options.last_will {
                state.wills.insert(self.client, will.clone());
            }
            drop(state);
            self.connected.store(true, Ordering::Release);
            tracing::debug!(client = self.client, endpoint = %options.endpoint, "In-memory client connected");
            Ok(())
        })
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        retained: bool,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            self.ensure_connected()?;
            if self.broker.publish_fails(topic) {
                return Err(TransportError::PublishRejected(topic.to_string()));
            }
            self.broker.publish(topic, payload, retained);
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a str, handler: MessageHandler) -> TransportFuture<'a> {
        Box::pin(async move {
            self.ensure_connected()?;
            if self.broker.subscribe_fails(topic) {
                return Err(TransportError::SubscribeRejected(topic.to_string()));
            }
            let sink = Arc::new(Sink::Handler(handler));
            let retained = self
                .broker
                .subscribe_sink(self.client, topic, Arc::clone(&sink));
            for message in &retained {
                sink.deliver(message);
            }
            Ok(())
        })
    }

    fn unsubscribe<'a>(&'a self, topic: &'a str) -> TransportFuture<'a> {
        Box::pin(async move {
            self.ensure_connected()?;
            self.broker
                .state
                .lock()
                .subscriptions
                .retain(|s| s.client != self.client || s.filter != topic);
            Ok(())
        })
    }

    fn disconnect(&self) -> TransportFuture<'_> {
        Box::pin(async move {
            self.ensure_connected()?;
            // A clean disconnect discards the will
            self.broker.release_client(self.client);
            self.connected.store(false, Ordering::Release);
            Ok(())
        })
    }
}
