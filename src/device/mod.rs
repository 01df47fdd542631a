// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device: root of the node/property tree and owner of the lifecycle.
//!
//! A [`Device`] is built in the `Init` state, where nodes and properties are
//! declared. [`Device::setup`] connects and publishes the tree;
//! [`Device::shutdown`] publishes `$state = disconnected` and disconnects.
//! Both return immediately and run their sequence on a background task.
//! Progress and failures are observed through
//! [`Device::subscribe_events`] or awaited with [`Device::wait_for_state`].
//!
//! ```
//! use std::sync::Arc;
//! use homie_device::{Configuration, Device, DeviceState};
//! use homie_device::transport::MemoryBroker;
//! use homie_device::types::DataType;
//!
//! # async fn example() -> homie_device::Result<()> {
//! let broker = MemoryBroker::new();
//! let config = Configuration::new("memory", "lamp", "Desk lamp")?;
//! let device = Device::new(config, "lamp-fw", "1.0.0", Arc::new(broker.transport()))?;
//!
//! let on = device.create_node("light", "light")?.get_property("on")?;
//! on.set_data_type(DataType::Boolean)?;
//! on.make_settable(|_, value| {
//!     println!("switch to {value}");
//!     Ok(())
//! })?;
//!
//! device.setup()?;
//! device.wait_for_state(DeviceState::Ready).await;
//! on.send(true).await?;
//!
//! assert_eq!(broker.retained("homie/lamp/light/on").as_deref(), Some("true"));
//!
//! device.shutdown()?;
//! device.wait_for_state(DeviceState::Init).await;
//! # Ok(())
//! # }
//! ```

mod lifecycle;

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::Configuration;
use crate::error::{Error, LifecycleConflict, Result};
use crate::event::{DeviceEvent, EventBus, LifecycleOperation};
use crate::node::Node;
use crate::property::Property;
use crate::state::DeviceState;
use crate::topic::{self, TopicId};
use crate::transport::Transport;

/// State shared between device handles, the tree, the lifecycle task and
/// the dispatcher.
pub(crate) struct DeviceShared {
    config: Configuration,
    firmware_name: String,
    firmware_version: String,
    base_topic: String,
    state: watch::Sender<DeviceState>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    nodes: RwLock<IndexMap<String, Arc<Node>>>,
    stats_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceShared {
    pub(crate) fn id(&self) -> &str {
        self.config.device_id()
    }

    pub(crate) fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub(crate) fn state(&self) -> DeviceState {
        *self.state.borrow()
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn report(&self, event: DeviceEvent) {
        self.events.publish(event);
    }

    /// Fails unless the tree behind `device` may still change.
    ///
    /// Callers hold the write lock of the part they mutate, so a concurrent
    /// `setup()` observes either the state before or after the mutation.
    pub(crate) fn ensure_mutable(device: &Weak<Self>) -> Result<()> {
        match device.upgrade() {
            Some(device) if device.state() == DeviceState::Init => Ok(()),
            _ => Err(LifecycleConflict::TreeFrozen.into()),
        }
    }

    pub(crate) fn find_property(&self, node: &str, property: &str) -> Option<Arc<Property>> {
        self.nodes.read().get(node)?.property(property)
    }

    fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().values().cloned().collect()
    }

    fn attribute_topic(&self, attribute: &str) -> String {
        topic::join(&[self.base_topic.as_str(), attribute])
    }

    /// Moves from the resting state of `operation` to its transient state.
    fn begin(&self, operation: LifecycleOperation) -> Result<()> {
        let (from, to) = match operation {
            LifecycleOperation::Setup => (DeviceState::Init, DeviceState::Connecting),
            LifecycleOperation::Shutdown => (DeviceState::Ready, DeviceState::Disconnecting),
        };

        let mut conflict = None;
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                conflict = Some(lifecycle_conflict(operation, *state));
                false
            }
        });

        if let Some(conflict) = conflict {
            tracing::debug!(device = %self.id(), %operation, %conflict, "Lifecycle call rejected");
            return Err(conflict.into());
        }
        self.announce(from, to);
        Ok(())
    }

    fn set_state(&self, to: DeviceState) {
        let from = self.state.send_replace(to);
        self.announce(from, to);
    }

    fn announce(&self, from: DeviceState, to: DeviceState) {
        tracing::info!(device = %self.id(), %from, %to, "Device state changed");
        self.report(DeviceEvent::state_changed(self.id(), from, to));
    }
}

fn lifecycle_conflict(operation: LifecycleOperation, state: DeviceState) -> LifecycleConflict {
    match (operation, state) {
        (_, DeviceState::Connecting | DeviceState::Disconnecting) => LifecycleConflict::Busy,
        (LifecycleOperation::Setup, _) => LifecycleConflict::AlreadyActive,
        (LifecycleOperation::Shutdown, _) => LifecycleConflict::NotActive,
    }
}

/// A Homie device.
///
/// `Device` is a cheap handle; clones share the same tree and lifecycle.
#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Device {
    /// Creates a device in the `Init` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: Configuration,
        firmware_name: impl Into<String>,
        firmware_version: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let base_topic = topic::join(&[config.root_topic(), config.device_id()]);
        let (state, _) = watch::channel(DeviceState::Init);

        tracing::debug!(device = %config.device_id(), topic = %base_topic, "Creating device");
        Ok(Self {
            shared: Arc::new(DeviceShared {
                firmware_name: firmware_name.into(),
                firmware_version: firmware_version.into(),
                events: EventBus::new(),
                nodes: RwLock::new(IndexMap::new()),
                stats_task: Mutex::new(None),
                base_topic,
                state,
                transport,
                config,
            }),
        })
    }

    /// Creates an MQTT device for the broker named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    #[cfg(feature = "mqtt")]
    pub fn mqtt(
        config: Configuration,
        firmware_name: impl Into<String>,
        firmware_version: impl Into<String>,
    ) -> Result<Self> {
        let transport = Arc::new(crate::transport::MqttTransport::new());
        Self::new(config, firmware_name, firmware_version, transport)
    }

    /// Returns the device id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.shared.id()
    }

    /// Returns the human-readable device name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.config.device_name()
    }

    /// Returns the device topic `<root>/<device>`.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.shared.base_topic()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.shared.config
    }

    /// Returns the firmware name.
    #[must_use]
    pub fn firmware_name(&self) -> &str {
        &self.shared.firmware_name
    }

    /// Returns the firmware version.
    #[must_use]
    pub fn firmware_version(&self) -> &str {
        &self.shared.firmware_version
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.shared.state()
    }

    /// Waits until the device reaches `state`.
    ///
    /// Returns immediately if the device is already in that state.
    pub async fn wait_for_state(&self, state: DeviceState) {
        let mut receiver = self.shared.state.subscribe();
        // The sender lives as long as `self`
        let _ = receiver.wait_for(|current| *current == state).await;
    }

    /// Returns a receiver for state changes and error reports.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }

    /// Creates a node.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidIdentifier` if `id` is not a valid topic id.
    /// - `Error::DuplicateIdentifier` if a node with that id exists.
    /// - `LifecycleConflict::TreeFrozen` outside of the `Init` state.
    pub fn create_node(&self, id: &str, node_type: impl Into<String>) -> Result<Arc<Node>> {
        let id = TopicId::new(id)?;
        let mut nodes = self.shared.nodes.write();
        DeviceShared::ensure_mutable(&Arc::downgrade(&self.shared))?;
        if nodes.contains_key(id.as_str()) {
            return Err(Error::DuplicateIdentifier {
                scope: self.id().to_string(),
                id: id.to_string(),
            });
        }

        tracing::debug!(device = %self.id(), node = %id, "Creating node");
        let node = Arc::new(Node::new(
            id.clone(),
            node_type.into(),
            self.shared.base_topic(),
            Arc::downgrade(&self.shared),
        ));
        nodes.insert(id.to_string(), Arc::clone(&node));
        Ok(node)
    }

    /// Returns the node `id` if it exists.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<Arc<Node>> {
        self.shared.nodes.read().get(id).cloned()
    }

    /// Returns all nodes in creation order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.shared.nodes()
    }

    /// Starts publishing the device.
    ///
    /// Moves to `Connecting` and returns; a background task then connects,
    /// publishes the tree, subscribes to the `set` topics of settable
    /// properties and moves to `Ready`. If any step fails the device returns
    /// to `Init` and a [`DeviceEvent::LifecycleFailed`] is reported.
    ///
    /// # Errors
    ///
    /// - `Error::NoRuntime` when called outside a Tokio runtime.
    /// - `LifecycleConflict::AlreadyActive` in the `Ready` state.
    /// - `LifecycleConflict::Busy` while a lifecycle sequence is in flight.
    pub fn setup(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        self.shared.begin(LifecycleOperation::Setup)?;
        runtime.spawn(lifecycle::setup(Arc::clone(&self.shared)));
        Ok(())
    }

    /// Stops publishing the device.
    ///
    /// Moves to `Disconnecting` and returns; a background task then
    /// publishes `$state = disconnected`, cancels the `set` subscriptions,
    /// disconnects and moves to `Init`. Failing steps are reported and
    /// skipped, the device always ends in `Init`.
    ///
    /// # Errors
    ///
    /// - `Error::NoRuntime` when called outside a Tokio runtime.
    /// - `LifecycleConflict::NotActive` in the `Init` state.
    /// - `LifecycleConflict::Busy` while a lifecycle sequence is in flight.
    pub fn shutdown(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        self.shared.begin(LifecycleOperation::Shutdown)?;
        runtime.spawn(lifecycle::shutdown(Arc::clone(&self.shared)));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("topic", &self.shared.base_topic)
            .field("state", &self.state())
            .field("nodes", &self.shared.nodes.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
