// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Setup and shutdown sequences, run on a background task.

use std::sync::Arc;

use tokio::time::{self, Instant, MissedTickBehavior};

use super::DeviceShared;
use crate::dispatcher::Dispatcher;
use crate::error::TransportError;
use crate::event::{DeviceEvent, LifecycleOperation};
use crate::state::{ConventionState, DeviceState};
use crate::transport::{ConnectOptions, LastWill};

/// Version of the convention announced in `$homie`.
pub(crate) const HOMIE_VERSION: &str = "3.0.1";

/// Value of the `$implementation` attribute.
pub(crate) const IMPLEMENTATION: &str = "homie-rs";

pub(super) async fn setup(shared: Arc<DeviceShared>) {
    tracing::info!(device = %shared.id(), "Setting up device");

    let options = ConnectOptions::from_config(&shared.config).with_last_will(LastWill {
        topic: shared.attribute_topic("$state"),
        payload: ConventionState::Lost.as_str().to_string(),
        retained: true,
    });

    if let Err(error) = shared.transport().connect(&options).await {
        fail_setup(&shared, &error);
        shared.set_state(DeviceState::Init);
        return;
    }

    if let Err(error) = announce(&shared).await {
        fail_setup(&shared, &error);
        if let Err(error) = shared.transport().disconnect().await {
            tracing::debug!(device = %shared.id(), %error, "Disconnect after failed setup");
        }
        shared.set_state(DeviceState::Init);
        return;
    }

    start_stats(&shared);
    shared.set_state(DeviceState::Ready);
}

pub(super) async fn shutdown(shared: Arc<DeviceShared>) {
    tracing::info!(device = %shared.id(), "Shutting down device");

    if let Some(task) = shared.stats_task.lock().take() {
        task.abort();
    }

    let transport = shared.transport();
    let step = transport
        .publish(
            &shared.attribute_topic("$state"),
            ConventionState::Disconnected.as_str(),
            true,
        )
        .await;
    report_shutdown_step(&shared, step);

    for topic in set_topics(&shared) {
        let step = transport.unsubscribe(&topic).await;
        report_shutdown_step(&shared, step);
    }

    let step = transport.disconnect().await;
    report_shutdown_step(&shared, step);

    shared.set_state(DeviceState::Init);
}

/// Publishes the device tree, subscribes to the `set` topics and publishes
/// `$state = ready`.
async fn announce(shared: &Arc<DeviceShared>) -> Result<(), TransportError> {
    let transport = shared.transport();
    let nodes = shared.nodes();

    let mut messages = device_attributes(shared);
    for node in &nodes {
        messages.extend(node.description());
        for property in node.properties() {
            messages.extend(property.description());
        }
    }
    for (topic, payload) in &messages {
        transport.publish(topic, payload, true).await?;
    }

    let topics = set_topics(shared);
    if !topics.is_empty() {
        let handler = Dispatcher::new(shared).into_handler();
        for topic in &topics {
            tracing::debug!(device = %shared.id(), topic = %topic, "Subscribing to set topic");
            transport.subscribe(topic, Arc::clone(&handler)).await?;
        }
    }

    transport
        .publish(
            &shared.attribute_topic("$state"),
            ConventionState::Ready.as_str(),
            true,
        )
        .await
}

fn device_attributes(shared: &DeviceShared) -> Vec<(String, String)> {
    let nodes = shared.nodes.read().keys().cloned().collect::<Vec<_>>().join(",");
    let mut messages = vec![
        (shared.attribute_topic("$homie"), HOMIE_VERSION.to_string()),
        (
            shared.attribute_topic("$name"),
            shared.config.device_name().to_string(),
        ),
        (
            shared.attribute_topic("$state"),
            ConventionState::Init.as_str().to_string(),
        ),
        (shared.attribute_topic("$fw/name"), shared.firmware_name.clone()),
        (
            shared.attribute_topic("$fw/version"),
            shared.firmware_version.clone(),
        ),
        (
            shared.attribute_topic("$implementation"),
            IMPLEMENTATION.to_string(),
        ),
        (shared.attribute_topic("$nodes"), nodes),
    ];

    let interval = shared.config.stats_interval();
    if !interval.is_zero() {
        messages.push((shared.attribute_topic("$stats"), "uptime".to_string()));
        messages.push((
            shared.attribute_topic("$stats/interval"),
            interval.as_secs().to_string(),
        ));
    }
    messages
}

fn set_topics(shared: &DeviceShared) -> Vec<String> {
    shared
        .nodes()
        .iter()
        .flat_map(|node| node.properties())
        .filter(|property| property.is_settable())
        .map(|property| property.set_topic())
        .collect()
}

/// Spawns the task publishing `$stats/uptime` every stats interval.
///
/// The task holds only a weak reference and ends once the device leaves
/// `Ready` or is released; shutdown aborts it right away.
fn start_stats(shared: &Arc<DeviceShared>) {
    let interval = shared.config.stats_interval();
    if interval.is_zero() {
        return;
    }

    let device = Arc::downgrade(shared);
    let topic = shared.attribute_topic("$stats/uptime");
    let started = Instant::now();

    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(shared) = device.upgrade() else {
                break;
            };
            match shared.state() {
                DeviceState::Ready => {}
                DeviceState::Connecting => continue,
                DeviceState::Init | DeviceState::Disconnecting => break,
            }

            let uptime = started.elapsed().as_secs().to_string();
            if let Err(error) = shared.transport().publish(&topic, &uptime, true).await {
                tracing::warn!(device = %shared.id(), %error, "Failed to publish uptime");
            }
        }
    });

    if let Some(previous) = shared.stats_task.lock().replace(task) {
        previous.abort();
    }
}

fn fail_setup(shared: &DeviceShared, error: &TransportError) {
    tracing::error!(device = %shared.id(), %error, "Device setup failed");
    shared.report(DeviceEvent::lifecycle_failed(
        shared.id(),
        LifecycleOperation::Setup,
        error,
    ));
}

fn report_shutdown_step(shared: &DeviceShared, step: Result<(), TransportError>) {
    if let Err(error) = step {
        tracing::warn!(device = %shared.id(), %error, "Shutdown step failed");
        shared.report(DeviceEvent::lifecycle_failed(
            shared.id(),
            LifecycleOperation::Shutdown,
            error,
        ));
    }
}
