// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing of incoming `set` commands to property callbacks.
//!
//! The dispatcher is the [`MessageHandler`] a device registers for every
//! settable property. It resolves `<root>/<device>/<node>/<property>/set`
//! back to the property, decodes the payload as UTF-8 and runs the
//! property's callback. Nothing here returns an error to the transport:
//! failures are reported on the device's event bus and the message is
//! dropped.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use crate::device::DeviceShared;
use crate::event::DeviceEvent;
use crate::topic::SetTopic;
use crate::transport::MessageHandler;

/// Outcome of dispatching one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// The callback ran and returned `Ok`.
    Handled,
    /// The callback returned an error or panicked.
    CallbackFailed,
    /// The message could not be routed to a callback.
    Rejected,
}

pub(crate) struct Dispatcher {
    device: Weak<DeviceShared>,
    base_topic: String,
}

impl Dispatcher {
    pub(crate) fn new(device: &Arc<DeviceShared>) -> Self {
        Self {
            base_topic: device.base_topic().to_string(),
            device: Arc::downgrade(device),
        }
    }

    /// Wraps the dispatcher into a handler for [`Transport::subscribe`](crate::transport::Transport::subscribe).
    pub(crate) fn into_handler(self) -> MessageHandler {
        let dispatcher = Arc::new(self);
        Arc::new(move |topic, payload| {
            dispatcher.dispatch(topic, payload);
        })
    }

    pub(crate) fn dispatch(&self, topic: &str, payload: &[u8]) -> Dispatch {
        let Some(device) = self.device.upgrade() else {
            tracing::trace!(topic, "Dropping message for a released device");
            return Dispatch::Rejected;
        };

        let Ok(text) = std::str::from_utf8(payload) else {
            device.report(DeviceEvent::invalid_message(
                device.id(),
                topic,
                "payload is not valid UTF-8",
            ));
            return Dispatch::Rejected;
        };

        let Some(set) = SetTopic::parse(&self.base_topic, topic) else {
            device.report(DeviceEvent::invalid_message(
                device.id(),
                topic,
                "not a set topic of this device",
            ));
            return Dispatch::Rejected;
        };

        let Some(property) = device.find_property(set.node, set.property) else {
            device.report(DeviceEvent::invalid_message(
                device.id(),
                topic,
                "unknown property",
            ));
            return Dispatch::Rejected;
        };

        let Some(callback) = property.set_callback() else {
            device.report(DeviceEvent::invalid_message(
                device.id(),
                topic,
                "property is not settable",
            ));
            return Dispatch::Rejected;
        };

        tracing::debug!(topic, payload = text, "Dispatching set command");
        match panic::catch_unwind(AssertUnwindSafe(|| callback(property.as_ref(), text))) {
            Ok(Ok(())) => Dispatch::Handled,
            Ok(Err(error)) => {
                device.report(DeviceEvent::callback_failed(
                    device.id(),
                    topic,
                    error.to_string(),
                ));
                Dispatch::CallbackFailed
            }
            Err(panic) => {
                device.report(DeviceEvent::callback_failed(
                    device.id(),
                    topic,
                    panic_message(panic.as_ref()),
                ));
                Dispatch::CallbackFailed
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("callback panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("callback panicked: {message}")
    } else {
        "callback panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::Configuration;
    use crate::device::Device;
    use crate::transport::MemoryBroker;

    fn device() -> Device {
        let config = Configuration::new("memory", "dev", "Dev").unwrap();
        Device::new(config, "fw", "1.0", Arc::new(MemoryBroker::new().transport())).unwrap()
    }

    #[test]
    fn routes_to_callback_with_raw_text() {
        let device = device();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let property = device.create_node("light", "t").unwrap().get_property("on").unwrap();
        property
            .make_settable(move |property, value| {
                assert_eq!(property.id(), "on");
                assert_eq!(value, "true");
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let dispatcher = Dispatcher::new(device.shared());
        let outcome = dispatcher.dispatch("homie/dev/light/on/set", b"true");

        assert_eq!(outcome, Dispatch::Handled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_error_is_reported() {
        let device = device();
        let mut events = device.subscribe_events();
        let property = device.create_node("light", "t").unwrap().get_property("on").unwrap();
        property
            .make_settable(|_, _| Err("rejected".into()))
            .unwrap();

        let outcome = Dispatcher::new(device.shared()).dispatch("homie/dev/light/on/set", b"x");

        assert_eq!(outcome, Dispatch::CallbackFailed);
        assert_eq!(
            events.try_recv().unwrap(),
            DeviceEvent::callback_failed("dev", "homie/dev/light/on/set", "rejected")
        );
    }

    #[test]
    fn callback_panic_is_contained() {
        let device = device();
        let mut events = device.subscribe_events();
        let property = device.create_node("light", "t").unwrap().get_property("on").unwrap();
        property.make_settable(|_, _| panic!("boom")).unwrap();

        let outcome = Dispatcher::new(device.shared()).dispatch("homie/dev/light/on/set", b"x");

        assert_eq!(outcome, Dispatch::CallbackFailed);
        match events.try_recv().unwrap() {
            DeviceEvent::CallbackFailed { error, .. } => assert!(error.contains("boom")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn rejects_unroutable_messages() {
        let device = device();
        let node = device.create_node("light", "t").unwrap();
        node.get_property("level").unwrap();
        node.get_property("on").unwrap().make_settable(|_, _| Ok(())).unwrap();
        let dispatcher = Dispatcher::new(device.shared());
        let mut events = device.subscribe_events();

        for (topic, payload) in [
            ("homie/dev/light/on/set", &[0xff, 0xfe][..]),
            ("homie/dev/light/on", b"true".as_slice()),
            ("homie/other/light/on/set", b"true".as_slice()),
            ("homie/dev/light/missing/set", b"true".as_slice()),
            ("homie/dev/light/level/set", b"1".as_slice()),
        ] {
            assert_eq!(dispatcher.dispatch(topic, payload), Dispatch::Rejected, "{topic}");
            assert!(matches!(
                events.try_recv().unwrap(),
                DeviceEvent::InvalidMessage { .. }
            ));
        }
    }
}
