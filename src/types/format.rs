// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `$format` property attribute.

use std::fmt;

use super::DataType;

/// Restricts or describes the values of a property.
///
/// # Examples
///
/// ```
/// use homie_device::types::{DataType, PropertyFormat};
///
/// let range = PropertyFormat::Range { min: 0.0, max: 100.0 };
/// assert_eq!(range.to_string(), "0:100");
/// assert!(range.applies_to(DataType::Integer));
///
/// let options = PropertyFormat::options(["low", "high"]);
/// assert_eq!(options.to_string(), "low,high");
/// assert!(!options.applies_to(DataType::Float));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyFormat {
    /// Numeric range `min:max` for integer and float properties.
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Allowed values of an enum property.
    Options(Vec<String>),
    /// Color triples are `r,g,b`.
    Rgb,
    /// Color triples are `h,s,v`.
    Hsv,
}

impl PropertyFormat {
    /// Creates an enum option list.
    #[must_use]
    pub fn options<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Options(options.into_iter().map(Into::into).collect())
    }

    /// Returns whether this format can be declared on a property of the
    /// given data type.
    #[must_use]
    pub fn applies_to(&self, data_type: DataType) -> bool {
        matches!(
            (self, data_type),
            (Self::Range { .. }, DataType::Integer | DataType::Float)
                | (Self::Options(_), DataType::Enum)
                | (Self::Rgb | Self::Hsv, DataType::Color)
        )
    }
}

impl fmt::Display for PropertyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { min, max } => write!(f, "{min}:{max}"),
            Self::Options(options) => f.write_str(&options.join(",")),
            Self::Rgb => f.write_str("rgb"),
            Self::Hsv => f.write_str("hsv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_range_keeps_decimals() {
        let range = PropertyFormat::Range {
            min: -0.5,
            max: 1.25,
        };
        assert_eq!(range.to_string(), "-0.5:1.25");
    }

    #[test]
    fn color_formats_only_apply_to_colors() {
        assert!(PropertyFormat::Rgb.applies_to(DataType::Color));
        assert!(PropertyFormat::Hsv.applies_to(DataType::Color));
        assert!(!PropertyFormat::Rgb.applies_to(DataType::String));
    }
}
