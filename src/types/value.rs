// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed property values and their canonical payloads.

use std::fmt;

use crate::error::ValueError;

use super::{Color, DataType, PropertyFormat};

/// A value sent on a property.
///
/// The [`data_type`](Self::data_type) of a value must equal the declared
/// data type of the property it is sent on. Plain Rust values convert into
/// the matching variant:
///
/// ```
/// use homie_device::types::{DataType, Value};
///
/// assert_eq!(Value::from(0.1).data_type(), DataType::Float);
/// assert_eq!(Value::from(42).data_type(), DataType::Integer);
/// assert_eq!(Value::from(false).to_payload(), "false");
/// assert_eq!(Value::enumeration("high").data_type(), DataType::Enum);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A `string` value.
    String(String),
    /// An `integer` value.
    Integer(i64),
    /// A `float` value.
    Float(f64),
    /// A `boolean` value.
    Boolean(bool),
    /// An `enum` value.
    Enum(String),
    /// A `color` value.
    Color(Color),
}

impl Value {
    /// Creates an enum value.
    #[must_use]
    pub fn enumeration(option: impl Into<String>) -> Self {
        Self::Enum(option.into())
    }

    /// Returns the data type of this value.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Integer(_) => DataType::Integer,
            Self::Float(_) => DataType::Float,
            Self::Boolean(_) => DataType::Boolean,
            Self::Enum(_) => DataType::Enum,
            Self::Color(_) => DataType::Color,
        }
    }

    /// Returns the canonical text published on the value topic.
    ///
    /// Numbers use Rust's `Display`, which is locale independent and
    /// round-trips through `str::parse`.
    #[must_use]
    pub fn to_payload(&self) -> String {
        self.to_string()
    }

    /// Parses the text form of a value of the given data type.
    ///
    /// Set-callbacks receive raw text; this is a convenience for turning it
    /// into a typed value. Color text is read as RGB unless `format` is
    /// [`PropertyFormat::Hsv`].
    ///
    /// # Errors
    ///
    /// Returns `ValueError` if the text is not a valid value of the type.
    ///
    /// # Examples
    ///
    /// ```
    /// use homie_device::types::{DataType, Value};
    ///
    /// let value = Value::parse(DataType::Boolean, "true", None).unwrap();
    /// assert_eq!(value, Value::Boolean(true));
    /// assert!(Value::parse(DataType::Integer, "1.5", None).is_err());
    /// ```
    pub fn parse(
        data_type: DataType,
        text: &str,
        format: Option<&PropertyFormat>,
    ) -> Result<Self, ValueError> {
        match data_type {
            DataType::String => Ok(Self::String(text.to_string())),
            DataType::Enum => Ok(Self::Enum(text.to_string())),
            DataType::Integer => text
                .trim()
                .parse()
                .map(Self::Integer)
                .map_err(|_| ValueError::InvalidInteger(text.to_string())),
            DataType::Float => match text.trim().parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(Self::Float(x)),
                Ok(_) => Err(ValueError::NotFinite(text.to_string())),
                Err(_) => Err(ValueError::InvalidFloat(text.to_string())),
            },
            DataType::Boolean => match text.trim() {
                "true" => Ok(Self::Boolean(true)),
                "false" => Ok(Self::Boolean(false)),
                _ => Err(ValueError::InvalidBoolean(text.to_string())),
            },
            DataType::Color => match format {
                Some(PropertyFormat::Hsv) => Color::parse_hsv(text).map(Self::Color),
                _ => Color::parse_rgb(text).map(Self::Color),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Enum(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Color(c) => write!(f, "{c}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Color> for Value {
    fn from(value: Color) -> Self {
        Self::Color(value)
    }
}
