// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Color values for `color` properties.
//!
//! Homie transports colors as a comma separated triple. Whether the triple
//! is RGB or HSV is declared by the property's `$format` (`rgb` or `hsv`).

use std::fmt;

use crate::error::ValueError;

/// A color triple.
///
/// # Examples
///
/// ```
/// use homie_device::types::Color;
///
/// let orange = Color::rgb(255, 128, 0);
/// assert_eq!(orange.to_string(), "255,128,0");
///
/// let parsed = Color::parse_rgb("255,128,0").unwrap();
/// assert_eq!(parsed, orange);
///
/// let teal = Color::hsv(180, 100, 50).unwrap();
/// assert_eq!(teal.to_string(), "180,100,50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// Red, green and blue channels (0-255).
    Rgb {
        /// Red component.
        red: u8,
        /// Green component.
        green: u8,
        /// Blue component.
        blue: u8,
    },
    /// Hue (0-360), saturation (0-100) and value (0-100).
    Hsv {
        /// Hue in degrees.
        hue: u16,
        /// Saturation in percent.
        saturation: u8,
        /// Value in percent.
        value: u8,
    },
}

impl Color {
    /// Creates an RGB color.
    #[must_use]
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::Rgb { red, green, blue }
    }

    /// Creates an HSV color.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if hue exceeds 360 or saturation or
    /// value exceed 100.
    pub fn hsv(hue: u16, saturation: u8, value: u8) -> Result<Self, ValueError> {
        check_range(hue, 360)?;
        check_range(u16::from(saturation), 100)?;
        check_range(u16::from(value), 100)?;
        Ok(Self::Hsv {
            hue,
            saturation,
            value,
        })
    }

    /// Parses an `r,g,b` triple.
    ///
    /// # Errors
    ///
    /// Returns `ValueError` if the text is not three comma separated
    /// components within 0-255.
    pub fn parse_rgb(text: &str) -> Result<Self, ValueError> {
        let [r, g, b] = split_triple(text)?;
        let channel = |v: u16| {
            u8::try_from(v).map_err(|_| ValueError::OutOfRange { max: 255, actual: v })
        };
        Ok(Self::rgb(channel(r)?, channel(g)?, channel(b)?))
    }

    /// Parses an `h,s,v` triple.
    ///
    /// # Errors
    ///
    /// Returns `ValueError` if the text is not three comma separated
    /// components within their ranges.
    pub fn parse_hsv(text: &str) -> Result<Self, ValueError> {
        let [h, s, v] = split_triple(text)?;
        let percent = |x: u16| {
            u8::try_from(x).map_err(|_| ValueError::OutOfRange { max: 100, actual: x })
        };
        Self::hsv(h, percent(s)?, percent(v)?)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb { red, green, blue } => write!(f, "{red},{green},{blue}"),
            Self::Hsv {
                hue,
                saturation,
                value,
            } => write!(f, "{hue},{saturation},{value}"),
        }
    }
}

fn check_range(actual: u16, max: u16) -> Result<(), ValueError> {
    if actual > max {
        return Err(ValueError::OutOfRange { max, actual });
    }
    Ok(())
}

fn split_triple(text: &str) -> Result<[u16; 3], ValueError> {
    let invalid = || ValueError::InvalidColor(text.to_string());
    let parts: Vec<u16> = text
        .split(',')
        .map(|part| part.trim().parse::<u16>().map_err(|_| invalid()))
        .collect::<Result<_, _>>()?;
    <[u16; 3]>::try_from(parts).map_err(|_| invalid())
}
