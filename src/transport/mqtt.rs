// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT transport built on `rumqttc`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::topic;

use super::{ConnectOptions, MessageHandler, Transport, TransportFuture};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 10;

/// State shared with the event loop task.
#[derive(Default)]
struct Shared {
    /// Subscription filters and their handlers.
    handlers: RwLock<Vec<(String, MessageHandler)>>,
    /// Subscribers waiting for a `SubAck`, oldest first.
    pending_subacks: Mutex<VecDeque<oneshot::Sender<bool>>>,
    /// Connection status.
    connected: AtomicBool,
}

struct Session {
    client: AsyncClient,
    task: JoinHandle<()>,
    shutdown_timeout: Duration,
}

/// MQTT transport for Homie devices.
///
/// All traffic uses QoS 1. The transport does not reconnect on its own: if
/// the connection drops, the broker publishes the registered last will and
/// later operations fail with [`TransportError::NotConnected`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use homie_device::{Configuration, Device};
/// use homie_device::transport::MqttTransport;
///
/// # async fn example() -> homie_device::Result<()> {
/// let config = Configuration::new("mqtt://192.168.1.50:1883", "lamp", "Desk Lamp")?;
/// let device = Device::new(config, "lamp-firmware", "1.0", Arc::new(MqttTransport::new()))?;
/// device.setup()?;
/// # Ok(())
/// # }
/// ```
pub struct MqttTransport {
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl MqttTransport {
    /// Creates a disconnected transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            session: Mutex::new(None),
        }
    }

    /// Returns whether the broker connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn client(&self) -> Result<AsyncClient, TransportError> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.client.clone())
            .ok_or(TransportError::NotConnected)
    }

    async fn connect_inner(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        if self.session.lock().is_some() {
            return Err(TransportError::ConnectionFailed(
                "transport is already connected".to_string(),
            ));
        }

        let (host, port) = parse_mqtt_url(&options.endpoint)?;
        let client_id = options.client_id.clone().unwrap_or_else(|| {
            let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("homie_{}_{}", std::process::id(), counter)
        });

        let mut mqtt_options = MqttOptions::new(&client_id, host.as_str(), port);
        mqtt_options.set_keep_alive(options.keep_alive);
        mqtt_options.set_clean_session(true);
        if let Some(credentials) = &options.credentials {
            mqtt_options.set_credentials(&credentials.username, &credentials.password);
        }
        if let Some(will) = &options.last_will {
            mqtt_options.set_last_will(rumqttc::LastWill::new(
                &will.topic,
                will.payload.clone(),
                QoS::AtLeastOnce,
                will.retained,
            ));
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (connack_tx, connack_rx) = oneshot::channel();
        let task = tokio::spawn(handle_mqtt_events(
            event_loop,
            Arc::clone(&self.shared),
            connack_tx,
        ));

        let timeout = options.connection_timeout;
        let outcome = match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(TransportError::ConnectionFailed(reason)),
            Ok(Err(_)) => Err(TransportError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )),
            Err(_) => Err(TransportError::ConnectionFailed(format!(
                "MQTT connection timeout after {}s",
                timeout.as_secs()
            ))),
        };
        if let Err(e) = outcome {
            task.abort();
            return Err(e);
        }

        tracing::info!(%host, port, client_id = %client_id, "Connected to MQTT broker");
        *self.session.lock() = Some(Session {
            client,
            task,
            shutdown_timeout: timeout,
        });
        Ok(())
    }

    async fn subscribe_inner(
        &self,
        filter: &str,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        let client = self.client()?;

        // Register first so retained messages sent right after the SubAck
        // are routed.
        self.shared
            .handlers
            .write()
            .push((filter.to_string(), handler));

        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared.pending_subacks.lock().push_back(ack_tx);

        if let Err(e) = client.subscribe(filter, QoS::AtLeastOnce).await {
            self.shared.pending_subacks.lock().pop_back();
            self.remove_handler(filter);
            return Err(TransportError::Mqtt(e));
        }

        match ack_rx.await {
            Ok(true) => {
                tracing::debug!(topic = %filter, "MQTT subscription acknowledged");
                Ok(())
            }
            Ok(false) => {
                self.remove_handler(filter);
                Err(TransportError::SubscribeRejected(filter.to_string()))
            }
            Err(_) => {
                self.remove_handler(filter);
                Err(TransportError::ChannelClosed(
                    "connection closed before SubAck".to_string(),
                ))
            }
        }
    }

    fn remove_handler(&self, filter: &str) {
        self.shared.handlers.write().retain(|(f, _)| f != filter);
    }

    async fn disconnect_inner(&self) -> Result<(), TransportError> {
        let session = self
            .session
            .lock()
            .take()
            .ok_or(TransportError::NotConnected)?;
        self.shared.handlers.write().clear();

        let result = session.client.disconnect().await;
        // Give the event loop the chance to flush the DISCONNECT packet
        let abort = session.task.abort_handle();
        if tokio::time::timeout(session.shutdown_timeout, session.task)
            .await
            .is_err()
        {
            tracing::warn!("MQTT event loop did not stop in time");
            abort.abort();
        }
        self.shared.connected.store(false, Ordering::Release);
        result.map_err(TransportError::Mqtt)
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.shared.handlers.read().len())
            .finish()
    }
}

impl Transport for MqttTransport {
    fn connect<'a>(&'a self, options: &'a ConnectOptions) -> TransportFuture<'a> {
        Box::pin(self.connect_inner(options))
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        retained: bool,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            let client = self.client()?;
            tracing::debug!(topic = %topic, payload = %payload, retained, "Publishing MQTT message");
            client
                .publish(topic, QoS::AtLeastOnce, retained, payload.to_string())
                .await
                .map_err(TransportError::Mqtt)
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a str, handler: MessageHandler) -> TransportFuture<'a> {
        Box::pin(self.subscribe_inner(topic, handler))
    }

    fn unsubscribe<'a>(&'a self, topic: &'a str) -> TransportFuture<'a> {
        Box::pin(async move {
            let client = self.client()?;
            self.remove_handler(topic);
            client.unsubscribe(topic).await.map_err(TransportError::Mqtt)
        })
    }

    fn disconnect(&self) -> TransportFuture<'_> {
        Box::pin(self.disconnect_inner())
    }
}

/// Parses an MQTT URL into host and port.
fn parse_mqtt_url(url: &str) -> Result<(String, u16), TransportError> {
    let url = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| TransportError::InvalidAddress(format!("Invalid port: {p}")))?;
        (h.to_string(), port)
    } else {
        (url.to_string(), 1883)
    };

    if host.is_empty() {
        return Err(TransportError::InvalidAddress(
            "MQTT broker host is required".to_string(),
        ));
    }

    Ok((host, port))
}

/// Drives the `rumqttc` event loop until the connection ends.
async fn handle_mqtt_events(
    mut event_loop: EventLoop,
    shared: Arc<Shared>,
    connack_tx: oneshot::Sender<Result<(), String>>,
) {
    use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet, SubscribeReasonCode};

    let mut connack_tx = Some(connack_tx);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT connected");
                let accepted = connack.code == ConnectReturnCode::Success;
                shared.connected.store(accepted, Ordering::Release);
                if let Some(tx) = connack_tx.take() {
                    let reply = if accepted {
                        Ok(())
                    } else {
                        Err(format!("connection refused: {:?}", connack.code))
                    };
                    let _ = tx.send(reply);
                }
                if !accepted {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                let accepted = suback
                    .return_codes
                    .iter()
                    .all(|code| !matches!(code, SubscribeReasonCode::Failure));
                tracing::debug!(?suback, accepted, "MQTT SubAck");
                if let Some(waiter) = shared.pending_subacks.lock().pop_front() {
                    let _ = waiter.send(accepted);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(topic = %publish.topic, "MQTT message received");
                let handlers: Vec<MessageHandler> = shared
                    .handlers
                    .read()
                    .iter()
                    .filter(|(filter, _)| topic::matches(filter, &publish.topic))
                    .map(|(_, handler)| Arc::clone(handler))
                    .collect();
                for handler in handlers {
                    handler(publish.topic.as_str(), &publish.payload[..]);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::info!("MQTT disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT event loop error");
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(Err(e.to_string()));
                }
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::Release);
    // Dropping the senders fails every pending subscribe
    shared.pending_subacks.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mqtt_url_with_port() {
        let (host, port) = parse_mqtt_url("mqtt://192.168.1.50:1883").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_default_port() {
        let (host, port) = parse_mqtt_url("broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_tcp_scheme() {
        let (host, port) = parse_mqtt_url("tcp://127.0.0.1:8883").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 8883);
    }

    #[test]
    fn parse_mqtt_url_rejects_bad_port_and_empty_host() {
        assert!(matches!(
            parse_mqtt_url("mqtt://broker:http"),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_mqtt_url("mqtt://:1883"),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn operations_fail_before_connect() {
        let transport = MqttTransport::new();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.publish("a", "b", false).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.disconnect().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let transport = MqttTransport::new();
        let options = ConnectOptions {
            endpoint: "127.0.0.1:1".to_string(),
            client_id: Some("homie-test".to_string()),
            credentials: None,
            keep_alive: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(2),
            last_will: None,
        };
        let err = transport.connect(&options).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
        assert!(!transport.is_connected());
    }
}
