// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for Dyson device control.
//!
//! This module provides type-safe representations of the values carried in
//! device payloads. Each type ensures values are within their valid ranges at
//! construction time and knows its own wire encoding.
//!
//! # Types
//!
//! - [`ProductType`] - Product family from the account manifest code
//! - [`FanMode`] - Off/Fan/Auto operating mode
//! - [`FanSpeed`] - Speed level (1-10) or automatic
//! - [`QualityTarget`] - Air quality target for auto mode
//! - [`SleepTimer`] - Sleep timer in minutes (0 = disabled)
//! - [`HeatMode`] / [`HeatTarget`] - Heating controls (Hot+Cool only)
//! - [`PowerMode`] / [`RobotMode`] / [`CleaningPhase`] - 360 Eye state

mod fan;
mod heat;
mod product;
mod sleep_timer;
mod vacuum;

pub use fan::{FanMode, FanSpeed, QualityTarget, SpeedLevel};
pub use heat::{HeatMode, HeatTarget};
pub use product::ProductType;
pub use sleep_timer::SleepTimer;
pub use vacuum::{CleaningPhase, Position, PowerMode, RobotMode};

use crate::error::ValueError;

/// Encodes a boolean switch as the device's `ON`/`OFF` literal.
pub(crate) const fn on_off(value: bool) -> &'static str {
    if value { "ON" } else { "OFF" }
}

/// Parses an `ON`/`OFF` literal.
pub(crate) fn parse_on_off(field: &'static str, value: &str) -> Result<bool, ValueError> {
    match value {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(ValueError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}

/// Parses a zero-padded decimal string such as `"0054"`.
pub(crate) fn parse_padded(field: &'static str, value: &str) -> Result<u16, ValueError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ValueError::InvalidValue {
            field,
            value: value.to_string(),
        })
}
