// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Nodes: named groups of properties within a device.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::device::DeviceShared;
use crate::error::Result;
use crate::property::Property;
use crate::topic::{self, TopicId};

/// A node of a device.
///
/// Properties keep their creation order, which is the order of the
/// `$properties` attribute.
pub struct Node {
    id: TopicId,
    node_type: String,
    topic: String,
    name: RwLock<String>,
    properties: RwLock<IndexMap<String, Arc<Property>>>,
    device: Weak<DeviceShared>,
}

impl Node {
    pub(crate) fn new(
        id: TopicId,
        node_type: String,
        device_topic: &str,
        device: Weak<DeviceShared>,
    ) -> Self {
        Self {
            topic: topic::join(&[device_topic, id.as_str()]),
            name: RwLock::new(id.to_string()),
            properties: RwLock::new(IndexMap::new()),
            node_type,
            device,
            id,
        }
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the node type.
    #[must_use]
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Returns the node topic `<root>/<device>/<node>`.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the human-readable name (defaults to the id).
    #[must_use]
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Sets the human-readable name.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleConflict::TreeFrozen` outside of the `Init` state.
    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let mut current = self.name.write();
        DeviceShared::ensure_mutable(&self.device)?;
        *current = name.into();
        Ok(())
    }

    /// Returns the property `id`, creating it on first use.
    ///
    /// A new property is a string property without unit that is not
    /// settable. Asking again for the same id returns the same property.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidIdentifier` if `id` is not a valid topic id.
    /// - `LifecycleConflict::TreeFrozen` if the property does not exist yet
    ///   and the device is not in the `Init` state.
    pub fn get_property(&self, id: &str) -> Result<Arc<Property>> {
        if let Some(property) = self.property(id) {
            return Ok(property);
        }

        let id = TopicId::new(id)?;
        let mut properties = self.properties.write();
        DeviceShared::ensure_mutable(&self.device)?;
        let property = properties
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(node = %self.id, property = %id, "Creating property");
                Arc::new(Property::new(
                    id.clone(),
                    &self.id,
                    &self.topic,
                    self.device.clone(),
                ))
            });
        Ok(Arc::clone(property))
    }

    /// Returns the property `id` if it exists.
    #[must_use]
    pub fn property(&self, id: &str) -> Option<Arc<Property>> {
        self.properties.read().get(id).cloned()
    }

    /// Returns all properties in creation order.
    #[must_use]
    pub fn properties(&self) -> Vec<Arc<Property>> {
        self.properties.read().values().cloned().collect()
    }

    /// Returns the retained messages describing this node.
    pub(crate) fn description(&self) -> Vec<(String, String)> {
        let properties = self
            .properties
            .read()
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        vec![
            (topic::join(&[self.topic.as_str(), "$name"]), self.name()),
            (
                topic::join(&[self.topic.as_str(), "$type"]),
                self.node_type.clone(),
            ),
            (topic::join(&[self.topic.as_str(), "$properties"]), properties),
        ]
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("topic", &self.topic)
            .field("type", &self.node_type)
            .field("properties", &self.properties.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::device::Device;
    use crate::error::Error;
    use crate::transport::MemoryBroker;

    fn device() -> Device {
        let config = Configuration::new("memory", "dev", "Dev").unwrap();
        Device::new(config, "fw", "1.0", Arc::new(MemoryBroker::new().transport())).unwrap()
    }

    #[test]
    fn get_property_is_idempotent() {
        let device = device();
        let node = device.create_node("node", "t").unwrap();

        let first = node.get_property("prop").unwrap();
        let second = node.get_property("prop").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(node.properties().len(), 1);
    }

    #[test]
    fn get_property_rejects_invalid_ids() {
        let device = device();
        let node = device.create_node("node", "t").unwrap();

        for id in ["-bad", "bad-", "Bad", "bad_id", ""] {
            let err = node.get_property(id).unwrap_err();
            assert!(matches!(err, Error::InvalidIdentifier(_)), "{id}");
        }
        assert!(node.properties().is_empty());
    }

    #[test]
    fn description_lists_properties_in_creation_order() {
        let device = device();
        let node = device.create_node("node", "sensor").unwrap();
        node.set_name("Living room").unwrap();
        node.get_property("temperature").unwrap();
        node.get_property("humidity").unwrap();
        node.get_property("temperature").unwrap();

        assert_eq!(
            node.description(),
            [
                ("homie/dev/node/$name".to_string(), "Living room".to_string()),
                ("homie/dev/node/$type".to_string(), "sensor".to_string()),
                (
                    "homie/dev/node/$properties".to_string(),
                    "temperature,humidity".to_string()
                ),
            ]
        );
    }

    #[test]
    fn name_defaults_to_id() {
        let device = device();
        let node = device.create_node("node", "t").unwrap();
        assert_eq!(node.name(), "node");
        assert_eq!(node.node_type(), "t");
        assert_eq!(node.topic(), "homie/dev/node");
    }
}
