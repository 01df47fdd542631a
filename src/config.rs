// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device configuration.
//!
//! A [`Configuration`] names the broker endpoint and the device. It is
//! immutable once handed to [`Device::new`](crate::Device::new). Loading it
//! from a file is left to the application; the type implements
//! `serde::Deserialize` so it can be embedded in any serde-based config.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use homie_device::Configuration;
//!
//! let config = Configuration::builder()
//!     .broker_url("mqtt://192.168.1.50:1883")
//!     .device_id("living-room")
//!     .device_name("Living Room Sensors")
//!     .credentials("user", "secret")
//!     .stats_interval(Duration::from_secs(30))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.device_id(), "living-room");
//! assert_eq!(config.root_topic(), "homie");
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::topic::{is_valid_root, is_valid_topic_id};

/// Default root topic of the Homie convention.
pub const DEFAULT_ROOT_TOPIC: &str = "homie";

const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

/// Broker credentials.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for a Homie device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Configuration {
    broker_url: String,
    device_id: String,
    #[serde(default)]
    device_name: String,
    #[serde(default)]
    credentials: Option<Credentials>,
    #[serde(default = "default_root_topic")]
    root_topic: String,
    #[serde(default = "default_keep_alive_secs")]
    keep_alive_secs: u64,
    #[serde(default = "default_connection_timeout_secs")]
    connection_timeout_secs: u64,
    #[serde(default = "default_stats_interval_secs")]
    stats_interval_secs: u64,
}

fn default_root_topic() -> String {
    DEFAULT_ROOT_TOPIC.to_string()
}

fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

fn default_stats_interval_secs() -> u64 {
    DEFAULT_STATS_INTERVAL_SECS
}

impl Configuration {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Creates a configuration with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the device id is not a valid topic id or the
    /// broker URL is empty.
    pub fn new(
        broker_url: impl Into<String>,
        device_id: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Result<Self> {
        Self::builder()
            .broker_url(broker_url)
            .device_id(device_id)
            .device_name(device_name)
            .build()
    }

    /// Checks the invariants of a configuration.
    ///
    /// Called by [`ConfigurationBuilder::build`] and by `Device::new`, which
    /// covers configurations that were deserialized.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` for a bad device id and
    /// `Error::Config` for a bad broker URL or root topic.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_topic_id(&self.device_id) {
            return Err(Error::InvalidIdentifier(self.device_id.clone()));
        }
        if self.broker_url.trim().is_empty() {
            return Err(Error::Config("broker URL is required".to_string()));
        }
        if !is_valid_root(&self.root_topic) {
            return Err(Error::Config(format!(
                "invalid root topic {:?}",
                self.root_topic
            )));
        }
        Ok(())
    }

    /// Returns the broker URL.
    #[must_use]
    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    /// Returns the device id.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the human-readable device name, or the id when none is set.
    #[must_use]
    pub fn device_name(&self) -> &str {
        if self.device_name.is_empty() {
            &self.device_id
        } else {
            &self.device_name
        }
    }

    /// Returns the broker credentials, if any.
    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Returns the root topic (default `homie`).
    #[must_use]
    pub fn root_topic(&self) -> &str {
        &self.root_topic
    }

    /// Returns the MQTT keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Returns how long the transport waits for the broker to accept the
    /// connection.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the `$stats/uptime` publication interval. Zero disables it.
    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Builder for [`Configuration`].
#[derive(Debug)]
pub struct ConfigurationBuilder {
    config: Configuration,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self {
            config: Configuration {
                broker_url: String::new(),
                device_id: String::new(),
                device_name: String::new(),
                credentials: None,
                root_topic: default_root_topic(),
                keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
                connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
                stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
            },
        }
    }
}

impl ConfigurationBuilder {
    /// Sets the broker URL (`mqtt://host:port`, `tcp://host:port` or
    /// `host[:port]`).
    #[must_use]
    pub fn broker_url(mut self, url: impl Into<String>) -> Self {
        self.config.broker_url = url.into();
        self
    }

    /// Sets the device id.
    #[must_use]
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.config.device_id = id.into();
        self
    }

    /// Sets the human-readable device name.
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.config.device_name = name.into();
        self
    }

    /// Sets broker credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Sets the root topic (default `homie`).
    #[must_use]
    pub fn root_topic(mut self, root: impl Into<String>) -> Self {
        self.config.root_topic = root.into();
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive_secs = duration.as_secs();
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout_secs = duration.as_secs();
        self
    }

    /// Sets the `$stats/uptime` interval (default: 60 seconds, zero
    /// disables).
    #[must_use]
    pub fn stats_interval(mut self, duration: Duration) -> Self {
        self.config.stats_interval_secs = duration.as_secs();
        self
    }

    /// Validates and returns the configuration.
    ///
    /// An empty device name defaults to the device id.
    ///
    /// # Errors
    ///
    /// See [`Configuration::validate`].
    pub fn build(mut self) -> Result<Configuration> {
        if self.config.device_name.is_empty() {
            self.config.device_name.clone_from(&self.config.device_id);
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
