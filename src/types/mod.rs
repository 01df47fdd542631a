// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for Homie properties.
//!
//! Every property declares one [`DataType`]. Values sent on a property are
//! [`Value`]s whose type must match the declaration exactly; the value is
//! published in its canonical text form.
//!
//! # Types
//!
//! - [`DataType`] - `string`, `integer`, `float`, `boolean`, `enum`, `color`
//! - [`Value`] - A typed value with its canonical payload
//! - [`Color`] - RGB or HSV color triple
//! - [`PropertyFormat`] - The optional `$format` attribute

mod color;
mod data_type;
mod format;
mod value;

pub use color::Color;
pub use data_type::DataType;
pub use format::PropertyFormat;
pub use value::Value;
