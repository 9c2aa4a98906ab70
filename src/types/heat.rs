// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heating types for the Pure Hot+Cool Link family.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// Heating mode (`hmod`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeatMode {
    /// Heating is off.
    #[default]
    Off,
    /// Heating towards the target temperature.
    Heat,
}

impl HeatMode {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
        }
    }
}

impl FromStr for HeatMode {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFF" => Ok(Self::Off),
            "HEAT" => Ok(Self::Heat),
            _ => Err(ValueError::InvalidValue {
                field: "hmod",
                value: s.to_string(),
            }),
        }
    }
}

/// Heating target temperature (`hmax`), stored in tenths of a kelvin.
///
/// The device converts whole degrees using an offset of 273, so
/// 25 °C is sent as `"2980"`.
///
/// # Examples
///
/// ```
/// use purelink::types::HeatTarget;
///
/// let target = HeatTarget::celsius(25).unwrap();
/// assert_eq!(target.to_wire(), "2980");
///
/// let same = HeatTarget::fahrenheit(77).unwrap();
/// assert_eq!(same, target);
///
/// assert!(HeatTarget::celsius(38).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeatTarget(u16);

impl HeatTarget {
    /// Lowest accepted celsius target.
    pub const MIN_CELSIUS: u8 = 1;
    /// Highest accepted celsius target.
    pub const MAX_CELSIUS: u8 = 37;
    /// Lowest accepted fahrenheit target.
    pub const MIN_FAHRENHEIT: u8 = 34;
    /// Highest accepted fahrenheit target.
    pub const MAX_FAHRENHEIT: u8 = 98;

    /// Creates a target from whole degrees celsius.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [1, 37].
    pub fn celsius(value: u8) -> Result<Self, ValueError> {
        if !(Self::MIN_CELSIUS..=Self::MAX_CELSIUS).contains(&value) {
            return Err(ValueError::OutOfRange {
                min: u16::from(Self::MIN_CELSIUS),
                max: u16::from(Self::MAX_CELSIUS),
                actual: u16::from(value),
            });
        }
        Ok(Self((u16::from(value) + 273) * 10))
    }

    /// Creates a target from whole degrees fahrenheit.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [34, 98].
    pub fn fahrenheit(value: u8) -> Result<Self, ValueError> {
        if !(Self::MIN_FAHRENHEIT..=Self::MAX_FAHRENHEIT).contains(&value) {
            return Err(ValueError::OutOfRange {
                min: u16::from(Self::MIN_FAHRENHEIT),
                max: u16::from(Self::MAX_FAHRENHEIT),
                actual: u16::from(value),
            });
        }
        let celsius = (u16::from(value) - 32) * 5 / 9;
        Ok(Self((celsius + 273) * 10))
    }

    /// Creates a target from the raw tenths-of-kelvin value reported by the device.
    #[must_use]
    pub const fn from_tenths_kelvin(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw tenths-of-kelvin value.
    #[must_use]
    pub const fn tenths_kelvin(&self) -> u16 {
        self.0
    }

    /// Returns the target in kelvin.
    #[must_use]
    pub fn kelvin(&self) -> f32 {
        f32::from(self.0) / 10.0
    }

    /// Returns the target in degrees celsius, using the device's 273 offset.
    #[must_use]
    pub fn to_celsius(&self) -> f32 {
        self.kelvin() - 273.0
    }

    /// Returns the wire representation, zero-padded to four digits.
    #[must_use]
    pub fn to_wire(&self) -> String {
        format!("{:04}", self.0)
    }
}

impl Default for HeatTarget {
    fn default() -> Self {
        // 20 °C
        Self(2930)
    }
}

impl fmt::Display for HeatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}K", self.kelvin())
    }
}

impl FromStr for HeatTarget {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse_padded("hmax", s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn celsius_bounds() {
        assert_eq!(HeatTarget::celsius(1).unwrap().to_wire(), "2740");
        assert_eq!(HeatTarget::celsius(37).unwrap().to_wire(), "3100");
        assert!(HeatTarget::celsius(0).is_err());
        assert!(HeatTarget::celsius(38).is_err());
    }

    #[test]
    fn fahrenheit_bounds() {
        assert_eq!(HeatTarget::fahrenheit(34).unwrap().to_wire(), "2740");
        assert_eq!(HeatTarget::fahrenheit(98).unwrap().to_wire(), "3090");
        assert!(HeatTarget::fahrenheit(33).is_err());
        assert!(HeatTarget::fahrenheit(99).is_err());
    }

    #[test]
    fn decoded_target_is_absolute() {
        let target: HeatTarget = "2950".parse().unwrap();
        assert!((target.kelvin() - 295.0).abs() < f32::EPSILON);
        assert!((target.to_celsius() - 22.0).abs() < f32::EPSILON);
    }

    #[test]
    fn heat_mode_literals() {
        assert_eq!("HEAT".parse::<HeatMode>(), Ok(HeatMode::Heat));
        assert_eq!(HeatMode::Off.as_str(), "OFF");
    }
}
