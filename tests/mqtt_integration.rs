// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the MQTT transport using mockforge-mqtt.

#![cfg(feature = "mqtt")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use homie_device::transport::{ConnectOptions, MqttTransport, Transport};
use homie_device::{
    Configuration, DataType, Device, DeviceEvent, DeviceState, LifecycleOperation,
};
use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tokio::time::{sleep, timeout};

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18950);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to start, bind to port, and be ready to accept connections
    sleep(Duration::from_millis(500)).await;
}

fn config(port: u16, device_id: &str) -> Configuration {
    Configuration::builder()
        .broker_url(format!("mqtt://127.0.0.1:{port}"))
        .device_id(device_id)
        .connection_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

// ============================================================================
// MqttTransport Tests
// ============================================================================

mod transport {
    use super::*;

    #[tokio::test]
    async fn connect_publish_disconnect() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let transport = MqttTransport::new();
        let options = ConnectOptions::from_config(&config(port, "raw-client"));

        let result = transport.connect(&options).await;
        assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
        assert!(transport.is_connected());

        transport
            .publish("homie/raw-client/$state", "init", true)
            .await
            .unwrap();

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn connect_twice_fails() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let transport = MqttTransport::new();
        let options = ConnectOptions::from_config(&config(port, "twice"));
        transport.connect(&options).await.unwrap();

        assert!(transport.connect(&options).await.is_err());
        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn connect_with_tcp_scheme() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let mut options = ConnectOptions::from_config(&config(port, "tcp-client"));
        options.endpoint = format!("tcp://127.0.0.1:{port}");

        let transport = MqttTransport::new();
        assert!(transport.connect(&options).await.is_ok());
        transport.disconnect().await.unwrap();
    }
}

// ============================================================================
// Device over MQTT Tests
// ============================================================================

mod device_mqtt {
    use super::*;

    #[tokio::test]
    async fn setup_and_shutdown_cycle() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let device = Device::mqtt(config(port, "mqtt-sensor"), "sensor-fw", "0.1.0").unwrap();
        let temperature = device
            .create_node("climate", "sensor")
            .unwrap()
            .get_property("temperature")
            .unwrap();
        temperature.set_data_type(DataType::Float).unwrap();
        temperature.set_unit("°C").unwrap();

        device.setup().unwrap();
        timeout(
            Duration::from_secs(5),
            device.wait_for_state(DeviceState::Ready),
        )
        .await
        .expect("device did not become ready");

        temperature.send(21.5).await.unwrap();

        device.shutdown().unwrap();
        timeout(
            Duration::from_secs(5),
            device.wait_for_state(DeviceState::Init),
        )
        .await
        .expect("device did not shut down");
    }

    #[tokio::test]
    async fn set_command_reaches_callback() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let device = Device::mqtt(config(port, "mqtt-switch"), "switch-fw", "0.1.0").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(String::new()));
        let on = device
            .create_node("relay", "switch")
            .unwrap()
            .get_property("on")
            .unwrap();
        on.set_data_type(DataType::Boolean).unwrap();
        let (counter, last) = (Arc::clone(&calls), Arc::clone(&received));
        on.make_settable(move |_, value| {
            *last.lock() = value.to_string();
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        device.setup().unwrap();
        timeout(
            Duration::from_secs(5),
            device.wait_for_state(DeviceState::Ready),
        )
        .await
        .expect("device did not become ready");

        let (controller, mut event_loop) =
            AsyncClient::new(MqttOptions::new("controller", "127.0.0.1", port), 10);
        tokio::spawn(async move { while event_loop.poll().await.is_ok() {} });
        controller
            .publish("homie/mqtt-switch/relay/on/set", QoS::AtLeastOnce, false, "true")
            .await
            .unwrap();

        timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("set command was not dispatched");
        sleep(Duration::from_millis(200)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(received.lock().as_str(), "true");

        let _ = controller.disconnect().await;
        device.shutdown().unwrap();
        timeout(
            Duration::from_secs(5),
            device.wait_for_state(DeviceState::Init),
        )
        .await
        .expect("device did not shut down");
    }

    #[tokio::test]
    async fn unreachable_broker_reports_failure() {
        let port = get_test_port();
        // No broker on this port

        let device = Device::new(
            config(port, "orphan"),
            "fw",
            "1.0",
            Arc::new(MqttTransport::new()),
        )
        .unwrap();
        let mut events = device.subscribe_events();

        device.setup().unwrap();
        timeout(
            Duration::from_secs(5),
            device.wait_for_state(DeviceState::Init),
        )
        .await
        .expect("device did not revert to init");

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            failed |= matches!(
                event,
                DeviceEvent::LifecycleFailed {
                    operation: LifecycleOperation::Setup,
                    ..
                }
            );
        }
        assert!(failed);
    }
}
