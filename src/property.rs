// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Properties: the typed leaves of a device tree.
//!
//! A property is created on demand by [`Node::get_property`](crate::Node::get_property)
//! and configured while the device is in the `Init` state:
//!
//! ```
//! use std::sync::Arc;
//! use homie_device::{Configuration, Device};
//! use homie_device::transport::MemoryBroker;
//! use homie_device::types::DataType;
//!
//! # fn example() -> homie_device::Result<()> {
//! let config = Configuration::new("memory", "thermostat", "Thermostat")?;
//! let device = Device::new(config, "fw", "1.0", Arc::new(MemoryBroker::new().transport()))?;
//!
//! let node = device.create_node("heater", "heater")?;
//! let target = node.get_property("target")?;
//! target.set_unit("°C")?;
//! target.set_data_type(DataType::Float)?;
//! target.make_settable(|property, value| {
//!     println!("{} set to {value}", property.id());
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::device::DeviceShared;
use crate::error::{Error, LifecycleConflict, Result, TransportError, ValueError};
use crate::state::DeviceState;
use crate::topic::{self, SET_SUFFIX, TopicId};
use crate::types::{Color, DataType, PropertyFormat, Value};

/// Error type returned by set-callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked with the property and the raw text of a `set` command.
pub type SetCallback = Arc<dyn Fn(&Property, &str) -> std::result::Result<(), BoxError> + Send + Sync>;

struct Attributes {
    name: String,
    unit: String,
    data_type: DataType,
    format: Option<PropertyFormat>,
    on_set: Option<SetCallback>,
}

/// A named, typed value of a node.
pub struct Property {
    id: TopicId,
    node_id: String,
    topic: String,
    device: Weak<DeviceShared>,
    attributes: RwLock<Attributes>,
    last_value: Mutex<Option<Value>>,
}

impl Property {
    /// Creates a string property without unit that is not settable.
    pub(crate) fn new(id: TopicId, node_id: &str, node_topic: &str, device: Weak<DeviceShared>) -> Self {
        Self {
            topic: topic::join(&[node_topic, id.as_str()]),
            node_id: node_id.to_string(),
            attributes: RwLock::new(Attributes {
                name: id.to_string(),
                unit: String::new(),
                data_type: DataType::String,
                format: None,
                on_set: None,
            }),
            last_value: Mutex::new(None),
            device,
            id,
        }
    }

    /// Returns the property id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the id of the node owning this property.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Returns the value topic `<root>/<device>/<node>/<property>`.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the command topic `<value topic>/set`.
    #[must_use]
    pub fn set_topic(&self) -> String {
        topic::join(&[self.topic.as_str(), SET_SUFFIX])
    }

    /// Returns the human-readable name (defaults to the id).
    #[must_use]
    pub fn name(&self) -> String {
        self.attributes.read().name.clone()
    }

    /// Returns the unit.
    #[must_use]
    pub fn unit(&self) -> String {
        self.attributes.read().unit.clone()
    }

    /// Returns the declared data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.attributes.read().data_type
    }

    /// Returns the declared format.
    #[must_use]
    pub fn format(&self) -> Option<PropertyFormat> {
        self.attributes.read().format.clone()
    }

    /// Returns whether the property accepts `set` commands.
    #[must_use]
    pub fn is_settable(&self) -> bool {
        self.attributes.read().on_set.is_some()
    }

    /// Returns the last value sent on this property.
    #[must_use]
    pub fn last_value(&self) -> Option<Value> {
        self.last_value.lock().clone()
    }

    /// Sets the human-readable name.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleConflict::TreeFrozen` outside of the `Init` state.
    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.configure(|attrs| {
            attrs.name = name;
            Ok(())
        })
    }

    /// Sets the unit.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleConflict::TreeFrozen` outside of the `Init` state.
    pub fn set_unit(&self, unit: impl Into<String>) -> Result<()> {
        let unit = unit.into();
        self.configure(|attrs| {
            attrs.unit = unit;
            Ok(())
        })
    }

    /// Declares the data type.
    ///
    /// A format that does not apply to the new type is dropped, and so is a
    /// cached value of another type.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleConflict::TreeFrozen` outside of the `Init` state.
    pub fn set_data_type(&self, data_type: DataType) -> Result<()> {
        self.configure(|attrs| {
            attrs.data_type = data_type;
            if attrs
                .format
                .as_ref()
                .is_some_and(|format| !format.applies_to(data_type))
            {
                attrs.format = None;
            }
            let mut last_value = self.last_value.lock();
            if last_value
                .as_ref()
                .is_some_and(|value| value.data_type() != data_type)
            {
                *last_value = None;
            }
            Ok(())
        })
    }

    /// Declares the format.
    ///
    /// A cached value outside the new format is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFormat` if the format does not apply to the
    /// declared data type and `LifecycleConflict::TreeFrozen` outside of the
    /// `Init` state.
    pub fn set_format(&self, format: PropertyFormat) -> Result<()> {
        self.configure(|attrs| {
            if !format.applies_to(attrs.data_type) {
                return Err(Error::InvalidFormat {
                    data_type: attrs.data_type,
                    format: format.to_string(),
                });
            }
            attrs.format = Some(format);
            let mut last_value = self.last_value.lock();
            if last_value
                .as_ref()
                .is_some_and(|value| attrs.validate(value).is_err())
            {
                *last_value = None;
            }
            Ok(())
        })
    }

    /// Makes the property settable.
    ///
    /// `callback` runs for every message on the `set` topic once the next
    /// `setup()` has subscribed to it. It receives the raw text; parsing is
    /// up to the callback (see [`Value::parse`]). Errors and panics are
    /// reported as [`DeviceEvent::CallbackFailed`](crate::event::DeviceEvent::CallbackFailed).
    ///
    /// # Errors
    ///
    /// Returns `LifecycleConflict::TreeFrozen` outside of the `Init` state.
    pub fn make_settable<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Property, &str) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let callback: SetCallback = Arc::new(callback);
        self.configure(|attrs| {
            attrs.on_set = Some(callback);
            Ok(())
        })
    }

    /// Sends a value.
    ///
    /// In the `Ready` state the value is published retained on the value
    /// topic. In the `Init` state it is only cached and published by the
    /// next `setup()`.
    ///
    /// # Errors
    ///
    /// - `Error::TypeMismatch` if the value's type differs from the declared
    ///   data type; nothing is published.
    /// - `Error::Value` with `ValueError::NotFinite` for NaN or infinite
    ///   floats.
    /// - `Error::InvalidEnumValue` if an enum value is not one of the
    ///   declared options.
    /// - `Error::OutsideFormat` if a number is outside the declared range or
    ///   a color uses the other color model.
    /// - `LifecycleConflict::Busy` while a lifecycle sequence is in flight.
    /// - `Error::Transport` if publishing fails.
    pub async fn send(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.attributes.read().validate(&value)?;

        let device = self
            .device
            .upgrade()
            .ok_or(Error::Transport(TransportError::NotConnected))?;

        // Setup reads the cache after leaving Init, so the state is checked
        // under the cache lock.
        let state = {
            let mut cached = self.last_value.lock();
            let state = device.state();
            if state == DeviceState::Init {
                tracing::debug!(topic = %self.topic, "Caching property value until setup");
                *cached = Some(value);
                return Ok(());
            }
            state
        };

        match state {
            DeviceState::Ready => {
                let payload = value.to_payload();
                tracing::debug!(topic = %self.topic, payload = %payload, "Sending property value");
                device.transport().publish(&self.topic, &payload, true).await?;
                *self.last_value.lock() = Some(value);
                Ok(())
            }
            DeviceState::Init | DeviceState::Connecting | DeviceState::Disconnecting => {
                Err(LifecycleConflict::Busy.into())
            }
        }
    }

    /// Returns the registered set-callback.
    pub(crate) fn set_callback(&self) -> Option<SetCallback> {
        self.attributes.read().on_set.clone()
    }

    /// Returns the retained messages describing this property, followed by
    /// the cached value if there is one.
    pub(crate) fn description(&self) -> Vec<(String, String)> {
        let attrs = self.attributes.read();
        let mut messages = Vec::with_capacity(7);
        if !attrs.name.is_empty() {
            messages.push((self.attribute_topic("$name"), attrs.name.clone()));
        }
        // An empty retained payload would clear the topic
        if !attrs.unit.is_empty() {
            messages.push((self.attribute_topic("$unit"), attrs.unit.clone()));
        }
        messages.push((
            self.attribute_topic("$datatype"),
            attrs.data_type.as_str().to_string(),
        ));
        messages.push((
            self.attribute_topic("$settable"),
            attrs.on_set.is_some().to_string(),
        ));
        messages.push((self.attribute_topic("$retained"), "true".to_string()));
        if let Some(format) = &attrs.format {
            messages.push((self.attribute_topic("$format"), format.to_string()));
        }
        drop(attrs);

        if let Some(value) = self.last_value.lock().as_ref() {
            messages.push((self.topic.clone(), value.to_payload()));
        }
        messages
    }

    fn attribute_topic(&self, attribute: &str) -> String {
        topic::join(&[self.topic.as_str(), attribute])
    }

    fn configure<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Attributes) -> Result<()>,
    {
        let mut attrs = self.attributes.write();
        DeviceShared::ensure_mutable(&self.device)?;
        apply(&mut attrs)
    }
}

impl Attributes {
    /// Checks a value against the declared data type and format.
    fn validate(&self, value: &Value) -> Result<()> {
        if value.data_type() != self.data_type {
            return Err(Error::TypeMismatch {
                expected: self.data_type,
                actual: value.data_type(),
            });
        }
        if let Value::Float(x) = value
            && !x.is_finite()
        {
            return Err(ValueError::NotFinite(x.to_string()).into());
        }
        let Some(format) = &self.format else {
            return Ok(());
        };
        if let (Value::Enum(option), PropertyFormat::Options(options)) = (value, format)
            && !options.contains(option)
        {
            return Err(Error::InvalidEnumValue {
                value: option.clone(),
                options: options.join(","),
            });
        }
        let inside = match (value, format) {
            #[allow(clippy::cast_precision_loss)]
            (Value::Integer(n), PropertyFormat::Range { min, max }) => {
                (*min..=*max).contains(&(*n as f64))
            }
            (Value::Float(x), PropertyFormat::Range { min, max }) => (*min..=*max).contains(x),
            (Value::Color(color), PropertyFormat::Rgb) => matches!(color, Color::Rgb { .. }),
            (Value::Color(color), PropertyFormat::Hsv) => matches!(color, Color::Hsv { .. }),
            _ => true,
        };
        if inside {
            Ok(())
        } else {
            Err(Error::OutsideFormat {
                value: value.to_payload(),
                format: format.to_string(),
            })
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs = self.attributes.read();
        f.debug_struct("Property")
            .field("topic", &self.topic)
            .field("name", &attrs.name)
            .field("unit", &attrs.unit)
            .field("data_type", &attrs.data_type)
            .field("format", &attrs.format)
            .field("settable", &attrs.on_set.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Configuration;
    use crate::device::Device;
    use crate::transport::MemoryBroker;

    fn device() -> Device {
        let config = Configuration::new("memory", "dev", "Dev").unwrap();
        Device::new(config, "fw", "1.0", Arc::new(MemoryBroker::new().transport())).unwrap()
    }

    #[test]
    fn defaults() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("prop").unwrap();

        assert_eq!(property.name(), "prop");
        assert_eq!(property.unit(), "");
        assert_eq!(property.data_type(), DataType::String);
        assert!(!property.is_settable());
        assert_eq!(property.topic(), "homie/dev/node/prop");
        assert_eq!(property.set_topic(), "homie/dev/node/prop/set");
    }

    #[test]
    fn description_order() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("prop").unwrap();
        property.set_unit("test-unit").unwrap();
        property.set_data_type(DataType::Float).unwrap();

        let topics: Vec<String> = property.description().into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            topics,
            [
                "homie/dev/node/prop/$name",
                "homie/dev/node/prop/$unit",
                "homie/dev/node/prop/$datatype",
                "homie/dev/node/prop/$settable",
                "homie/dev/node/prop/$retained",
            ]
        );
    }

    #[test]
    fn settable_flag_is_published() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("prop").unwrap();
        let settable = |p: &Property| {
            p.description()
                .into_iter()
                .find(|(t, _)| t.ends_with("$settable"))
                .map(|(_, v)| v)
                .unwrap()
        };

        assert_eq!(settable(&property), "false");
        property.make_settable(|_, _| Ok(())).unwrap();
        assert_eq!(settable(&property), "true");
        assert!(property.is_settable());
    }

    #[test]
    fn format_must_match_data_type() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("mode").unwrap();

        let err = property.set_format(PropertyFormat::options(["a", "b"])).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { data_type: DataType::String, .. }));

        property.set_data_type(DataType::Enum).unwrap();
        property.set_format(PropertyFormat::options(["a", "b"])).unwrap();
        assert_eq!(property.format(), Some(PropertyFormat::options(["a", "b"])));

        // Changing the type drops a format that no longer applies
        property.set_data_type(DataType::Integer).unwrap();
        assert!(property.format().is_none());
    }

    #[tokio::test]
    async fn send_rejects_type_mismatch() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("flag").unwrap();
        property.set_data_type(DataType::Boolean).unwrap();

        let err = property.send(0.1).await.unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: DataType::Boolean,
                actual: DataType::Float
            }
        ));
        assert!(property.last_value().is_none());
    }

    #[tokio::test]
    async fn send_rejects_unknown_enum_option() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("mode").unwrap();
        property.set_data_type(DataType::Enum).unwrap();
        property.set_format(PropertyFormat::options(["low", "high"])).unwrap();

        let err = property.send(Value::enumeration("max")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEnumValue { .. }));
        assert!(property.send(Value::enumeration("low")).await.is_ok());
    }

    #[tokio::test]
    async fn send_rejects_non_finite_floats() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("temp").unwrap();
        property.set_data_type(DataType::Float).unwrap();

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = property.send(value).await.unwrap_err();
            assert!(matches!(err, Error::Value(ValueError::NotFinite(_))));
        }
        assert!(property.last_value().is_none());
    }

    #[tokio::test]
    async fn send_enforces_range_format() {
        let device = device();
        let node = device.create_node("node", "t").unwrap();
        let level = node.get_property("level").unwrap();
        level.set_data_type(DataType::Integer).unwrap();
        level.set_format(PropertyFormat::Range { min: 0.0, max: 10.0 }).unwrap();
        let ratio = node.get_property("ratio").unwrap();
        ratio.set_data_type(DataType::Float).unwrap();
        ratio.set_format(PropertyFormat::Range { min: -1.0, max: 1.0 }).unwrap();

        let err = level.send(11).await.unwrap_err();
        assert!(matches!(
            err,
            Error::OutsideFormat { ref value, ref format } if value == "11" && format == "0:10"
        ));
        assert!(matches!(level.send(-1).await, Err(Error::OutsideFormat { .. })));
        assert!(matches!(ratio.send(1.5).await, Err(Error::OutsideFormat { .. })));
        assert!(level.send(0).await.is_ok());
        assert!(level.send(10).await.is_ok());
        assert!(ratio.send(-1.0).await.is_ok());
        assert_eq!(level.last_value(), Some(Value::Integer(10)));
    }

    #[tokio::test]
    async fn send_enforces_color_model() {
        let device = device();
        let node = device.create_node("node", "t").unwrap();
        let rgb = node.get_property("rgb").unwrap();
        rgb.set_data_type(DataType::Color).unwrap();
        rgb.set_format(PropertyFormat::Rgb).unwrap();
        let hsv = node.get_property("hsv").unwrap();
        hsv.set_data_type(DataType::Color).unwrap();
        hsv.set_format(PropertyFormat::Hsv).unwrap();

        let red = Color::rgb(255, 0, 0);
        let blue = Color::hsv(240, 100, 100).unwrap();
        assert!(matches!(rgb.send(blue).await, Err(Error::OutsideFormat { .. })));
        assert!(matches!(hsv.send(red).await, Err(Error::OutsideFormat { .. })));
        assert!(rgb.send(red).await.is_ok());
        assert!(hsv.send(blue).await.is_ok());
    }

    #[tokio::test]
    async fn narrowing_format_drops_cached_value() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("level").unwrap();
        property.set_data_type(DataType::Integer).unwrap();
        property.send(50).await.unwrap();

        property.set_format(PropertyFormat::Range { min: 0.0, max: 100.0 }).unwrap();
        assert_eq!(property.last_value(), Some(Value::Integer(50)));
        property.set_format(PropertyFormat::Range { min: 0.0, max: 10.0 }).unwrap();
        assert!(property.last_value().is_none());
    }

    #[tokio::test]
    async fn send_in_init_caches_value() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("level").unwrap();
        property.set_data_type(DataType::Integer).unwrap();

        property.send(42).await.unwrap();
        assert_eq!(property.last_value(), Some(Value::Integer(42)));

        let (topic, payload) = property.description().pop().unwrap();
        assert_eq!(topic, "homie/dev/node/level");
        assert_eq!(payload, "42");
    }

    #[tokio::test]
    async fn changing_type_drops_cached_value() {
        let device = device();
        let property = device.create_node("node", "t").unwrap().get_property("level").unwrap();
        property.send("text").await.unwrap();

        property.set_data_type(DataType::Integer).unwrap();
        assert!(property.last_value().is_none());
    }

    #[test]
    fn detached_property_is_frozen() {
        let property = {
            let device = device();
            device.create_node("node", "t").unwrap().get_property("prop").unwrap()
        };
        let err = property.set_unit("x").unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleConflict::TreeFrozen)));
    }
}
