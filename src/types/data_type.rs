// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property data types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The data type declared by a property, published as `$datatype`.
///
/// # Examples
///
/// ```
/// use homie_device::types::DataType;
///
/// assert_eq!(DataType::Float.as_str(), "float");
/// assert_eq!("boolean".parse::<DataType>().unwrap(), DataType::Boolean);
/// assert_eq!(DataType::default(), DataType::String);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Free-form text.
    #[default]
    String,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit floating point number.
    Float,
    /// `true` or `false`.
    Boolean,
    /// One of a fixed set of text options.
    Enum,
    /// RGB or HSV color triple.
    Color,
}

impl DataType {
    /// Returns the `$datatype` payload for this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Enum => "enum",
            Self::Color => "color",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "boolean" => Ok(Self::Boolean),
            "enum" => Ok(Self::Enum),
            "color" => Ok(Self::Color),
            other => Err(Error::Config(format!("unknown data type {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_are_lowercase() {
        let all = [
            (DataType::String, "string"),
            (DataType::Integer, "integer"),
            (DataType::Float, "float"),
            (DataType::Boolean, "boolean"),
            (DataType::Enum, "enum"),
            (DataType::Color, "color"),
        ];
        for (data_type, payload) in all {
            assert_eq!(data_type.to_string(), payload);
            assert_eq!(payload.parse::<DataType>().unwrap(), data_type);
        }
    }

    #[test]
    fn parse_rejects_uppercase() {
        assert!("FLOAT".parse::<DataType>().is_err());
    }
}
