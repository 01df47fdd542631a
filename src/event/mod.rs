// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for device lifecycle and dispatch reports.
//!
//! Lifecycle sequences run in the background and set-callbacks run on the
//! transport's delivery context, so their failures cannot be returned to a
//! caller. They are published on an [`EventBus`] instead, together with
//! every lifecycle state transition.
//!
//! # Examples
//!
//! ```
//! use homie_device::event::{DeviceEvent, EventBus};
//! use homie_device::state::DeviceState;
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(DeviceEvent::state_changed("lamp", DeviceState::Init, DeviceState::Connecting));
//! assert!(rx.try_recv().unwrap().is_state_change());
//! ```

mod device_event;
mod event_bus;

pub use device_event::{DeviceEvent, LifecycleOperation};
pub use event_bus::EventBus;
