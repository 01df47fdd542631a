// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic identifiers and topic paths.
//!
//! Device, node and property identifiers become topic segments, so they are
//! restricted to the Homie ID grammar: lowercase ASCII letters and digits,
//! optionally separated by single hyphens, never starting or ending with a
//! hyphen.
//!
//! ```text
//! <root>/<device>/$name
//! <root>/<device>/<node>/$type
//! <root>/<device>/<node>/<property>
//! <root>/<device>/<node>/<property>/set
//! ```

use std::fmt;
use std::ops::Deref;

use crate::error::{Error, Result};

/// Suffix of the topic that receives commands for a settable property.
pub const SET_SUFFIX: &str = "set";

/// Returns whether `id` satisfies the topic ID grammar.
///
/// # Examples
///
/// ```
/// use homie_device::is_valid_topic_id;
///
/// assert!(is_valid_topic_id("test-topic"));
/// assert!(is_valid_topic_id("test2topic"));
/// assert!(!is_valid_topic_id("-test-topic"));
/// assert!(!is_valid_topic_id("Test-topic"));
/// assert!(!is_valid_topic_id("$test-topic"));
/// ```
#[must_use]
pub fn is_valid_topic_id(id: &str) -> bool {
    !id.is_empty()
        && id.split('-').all(|part| {
            !part.is_empty()
                && part
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
}

/// A validated topic identifier.
///
/// # Examples
///
/// ```
/// use homie_device::topic::TopicId;
///
/// let id = TopicId::new("living-room").unwrap();
/// assert_eq!(id.as_str(), "living-room");
/// assert!(TopicId::new("Living Room").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicId(String);

impl TopicId {
    /// Validates `id` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` if `id` violates the grammar.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if is_valid_topic_id(&id) {
            Ok(Self(id))
        } else {
            Err(Error::InvalidIdentifier(id))
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for TopicId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TopicId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns whether `root` can prefix device topics.
///
/// A root is one or more non-empty `/` separated segments without MQTT
/// wildcards.
#[must_use]
pub fn is_valid_root(root: &str) -> bool {
    !root.is_empty()
        && root
            .split('/')
            .all(|segment| !segment.is_empty() && !segment.contains(['+', '#']))
}

/// Joins topic segments with `/`.
#[must_use]
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut topic = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            topic.push('/');
        }
        topic.push_str(segment.as_ref());
    }
    topic
}

/// Returns whether `topic` matches the MQTT topic `filter`.
///
/// Supports the single level (`+`) and multi level (`#`) wildcards.
///
/// # Examples
///
/// ```
/// use homie_device::topic::matches;
///
/// assert!(matches("homie/+/$state", "homie/lamp/$state"));
/// assert!(matches("homie/lamp/#", "homie/lamp/light/on/set"));
/// assert!(!matches("homie/+/$state", "homie/lamp/light/$type"));
/// ```
#[must_use]
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut topic_levels = topic.split('/');
    for level in filter.split('/') {
        match level {
            "#" => return true,
            "+" => {
                if topic_levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if topic_levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    topic_levels.next().is_none()
}

/// A resolved `<root>/<device>/<node>/<property>/set` topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetTopic<'a> {
    /// The node identifier.
    pub node: &'a str,
    /// The property identifier.
    pub property: &'a str,
}

impl<'a> SetTopic<'a> {
    /// Resolves `topic` relative to the device base topic
    /// `<root>/<device>`.
    ///
    /// Returns `None` if the topic is not a set topic of that device.
    ///
    /// # Examples
    ///
    /// ```
    /// use homie_device::topic::SetTopic;
    ///
    /// let set = SetTopic::parse("homie/lamp", "homie/lamp/light/on/set").unwrap();
    /// assert_eq!(set.node, "light");
    /// assert_eq!(set.property, "on");
    ///
    /// assert!(SetTopic::parse("homie/lamp", "homie/lamp/light/on").is_none());
    /// ```
    #[must_use]
    pub fn parse(device_base: &str, topic: &'a str) -> Option<Self> {
        let rest = topic.strip_prefix(device_base)?.strip_prefix('/')?;
        let parts: Vec<&'a str> = rest.split('/').collect();
        match parts.as_slice() {
            &[node, property, SET_SUFFIX] => Some(Self { node, property }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        assert!(is_valid_topic_id("test-topic"));
        assert!(is_valid_topic_id("test-topic2"));
        assert!(is_valid_topic_id("test2topic"));
        assert!(is_valid_topic_id("a"));
        assert!(is_valid_topic_id("42"));
    }

    #[test]
    fn invalid_ids() {
        assert!(!is_valid_topic_id("-test-topic"));
        assert!(!is_valid_topic_id("-test-topic-"));
        assert!(!is_valid_topic_id("test-topic-"));
        assert!(!is_valid_topic_id("$test-topic"));
        assert!(!is_valid_topic_id("test&-topic"));
        assert!(!is_valid_topic_id("Test-topic"));
        assert!(!is_valid_topic_id("test--topic"));
        assert!(!is_valid_topic_id("test_topic"));
        assert!(!is_valid_topic_id("test/topic"));
        assert!(!is_valid_topic_id(""));
        assert!(!is_valid_topic_id("tést"));
    }

    #[test]
    fn topic_id_rejects_invalid() {
        let err = TopicId::new("Bad").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(id) if id == "Bad"));
    }

    #[test]
    fn roots() {
        assert!(is_valid_root("homie"));
        assert!(is_valid_root("site/homie"));
        assert!(!is_valid_root(""));
        assert!(!is_valid_root("homie/"));
        assert!(!is_valid_root("/homie"));
        assert!(!is_valid_root("homie/#"));
    }

    #[test]
    fn join_segments() {
        assert_eq!(join(&["homie", "dev", "$name"]), "homie/dev/$name");
        assert_eq!(join::<&str>(&[]), "");
    }

    #[test]
    fn filter_matching() {
        assert!(matches("a/b/c", "a/b/c"));
        assert!(!matches("a/b/c", "a/b"));
        assert!(!matches("a/b", "a/b/c"));
        assert!(matches("a/+/c", "a/x/c"));
        assert!(matches("#", "a/b/c"));
        assert!(matches("a/#", "a/b"));
        assert!(!matches("a/+", "a"));
    }

    #[test]
    fn set_topic_requires_device_prefix() {
        assert!(SetTopic::parse("homie/lamp", "homie/lampx/light/on/set").is_none());
        assert!(SetTopic::parse("homie/lamp", "homie/other/light/on/set").is_none());
        assert!(SetTopic::parse("homie/lamp", "homie/lamp/light/on/extra/set").is_none());
    }
}
