// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `homie_device` - publish devices on MQTT following the Homie convention.
//!
//! A device is a tree of nodes and properties. Once set up, the tree is
//! described by retained attribute topics under `<root>/<device>/`, property
//! values are published on their own topics, and controllers change settable
//! properties by publishing on `<...>/<property>/set`.
//!
//! # Features
//!
//! - **Device tree**: nodes and typed properties with name, unit, data type
//!   and format
//! - **Lifecycle**: non-blocking `setup()`/`shutdown()` with observable state
//!   transitions and a `lost` last-will
//! - **Commands**: set-callbacks per property, isolated from each other
//! - **Transports**: MQTT through `rumqttc` (feature `mqtt`, default) and an
//!   in-memory broker for tests
//!
//! # Quick Start
//!
//! ```no_run
//! use homie_device::types::DataType;
//! use homie_device::{Configuration, Device, DeviceState};
//!
//! #[tokio::main]
//! async fn main() -> homie_device::Result<()> {
//!     let config = Configuration::builder()
//!         .broker_url("mqtt://192.168.1.50:1883")
//!         .device_id("desk-lamp")
//!         .device_name("Desk lamp")
//!         .build()?;
//!     let device = Device::mqtt(config, "lamp-firmware", "1.0.0")?;
//!
//!     let light = device.create_node("light", "light")?;
//!     let on = light.get_property("on")?;
//!     on.set_data_type(DataType::Boolean)?;
//!     on.make_settable(|_, value| {
//!         println!("light switched {value}");
//!         Ok(())
//!     })?;
//!
//!     device.setup()?;
//!     device.wait_for_state(DeviceState::Ready).await;
//!
//!     on.send(true).await?;
//!
//!     device.shutdown()?;
//!     device.wait_for_state(DeviceState::Init).await;
//!     Ok(())
//! }
//! ```
//!
//! # Observing Failures
//!
//! Lifecycle sequences run in the background, and set-callbacks run when a
//! message arrives. Their failures are reported as
//! [`DeviceEvent`](event::DeviceEvent)s:
//!
//! ```no_run
//! # async fn example(device: homie_device::Device) {
//! use homie_device::event::DeviceEvent;
//!
//! let mut events = device.subscribe_events();
//! while let Ok(event) = events.recv().await {
//!     if let DeviceEvent::LifecycleFailed { error, .. } = &event {
//!         eprintln!("lifecycle failed: {error}");
//!     }
//! }
//! # }
//! ```

pub mod config;
mod device;
mod dispatcher;
pub mod error;
pub mod event;
mod node;
mod property;
pub mod state;
pub mod topic;
pub mod transport;
pub mod types;

pub use config::{Configuration, ConfigurationBuilder, Credentials};
pub use device::Device;
pub use error::{Error, LifecycleConflict, Result, TransportError, ValueError};
pub use event::{DeviceEvent, LifecycleOperation};
pub use node::Node;
pub use property::{BoxError, Property, SetCallback};
pub use state::{ConventionState, DeviceState};
pub use topic::{TopicId, is_valid_topic_id};
pub use transport::Transport;
pub use types::{Color, DataType, PropertyFormat, Value};
