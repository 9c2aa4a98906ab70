// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fan control types shared by the Pure Cool Link and Hot+Cool families.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// Operating mode of the fan (`fmod`).
///
/// # Examples
///
/// ```
/// use purelink::types::FanMode;
///
/// assert_eq!(FanMode::Auto.as_str(), "AUTO");
/// assert_eq!("FAN".parse::<FanMode>().unwrap(), FanMode::Fan);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FanMode {
    /// Fan is off.
    #[default]
    Off,
    /// Manual mode at the configured speed.
    Fan,
    /// Speed driven by the air quality sensor.
    Auto,
}

impl FanMode {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Fan => "FAN",
            Self::Auto => "AUTO",
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanMode {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFF" => Ok(Self::Off),
            "FAN" => Ok(Self::Fan),
            "AUTO" => Ok(Self::Auto),
            _ => Err(ValueError::InvalidValue {
                field: "fmod",
                value: s.to_string(),
            }),
        }
    }
}

/// A manual fan speed level (1-10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpeedLevel(u8);

impl SpeedLevel {
    /// Slowest level.
    pub const MIN: u8 = 1;

    /// Fastest level.
    pub const MAX: u8 = 10;

    /// Creates a new speed level.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [1, 10].
    pub fn new(value: u8) -> Result<Self, ValueError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ValueError::OutOfRange {
                min: u16::from(Self::MIN),
                max: u16::from(Self::MAX),
                actual: u16::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Returns the level.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

/// Fan speed (`fnsp`): a level from 1 to 10, or automatic.
///
/// On the wire levels are zero-padded to four digits.
///
/// # Examples
///
/// ```
/// use purelink::types::FanSpeed;
///
/// let speed = FanSpeed::level(4).unwrap();
/// assert_eq!(speed.to_wire(), "0004");
/// assert_eq!(speed.value(), Some(4));
/// assert_eq!("AUTO".parse::<FanSpeed>().unwrap(), FanSpeed::Auto);
/// assert!(FanSpeed::level(11).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FanSpeed {
    /// Speed chosen by the device.
    Auto,
    /// Manual level.
    Level(SpeedLevel),
}

impl FanSpeed {
    /// Creates a manual speed.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [1, 10].
    pub fn level(value: u8) -> Result<Self, ValueError> {
        SpeedLevel::new(value).map(Self::Level)
    }

    /// Returns the manual level, or `None` for automatic speed.
    #[must_use]
    pub const fn value(&self) -> Option<u8> {
        match self {
            Self::Auto => None,
            Self::Level(level) => Some(level.value()),
        }
    }

    /// Returns the wire representation (`"0001"`..`"0010"` or `"AUTO"`).
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Auto => "AUTO".to_string(),
            Self::Level(level) => format!("{:04}", level.value()),
        }
    }
}

impl Default for FanSpeed {
    fn default() -> Self {
        Self::Level(SpeedLevel(1))
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Level(level) => write!(f, "{}", level.value()),
        }
    }
}

impl FromStr for FanSpeed {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "AUTO" {
            return Ok(Self::Auto);
        }
        let level = s.parse::<u8>().map_err(|_| ValueError::InvalidValue {
            field: "fnsp",
            value: s.to_string(),
        })?;
        Self::level(level)
    }
}

/// Air quality target used in auto mode (`qtar`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QualityTarget {
    /// Normal sensitivity.
    #[default]
    Normal,
    /// High sensitivity.
    High,
    /// Best achievable quality.
    Better,
}

impl QualityTarget {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "0004",
            Self::High => "0003",
            Self::Better => "0001",
        }
    }
}

impl FromStr for QualityTarget {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0004" => Ok(Self::Normal),
            "0003" => Ok(Self::High),
            "0001" => Ok(Self::Better),
            _ => Err(ValueError::InvalidValue {
                field: "qtar",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_levels_encode_padded() {
        for v in 1..=10 {
            let speed = FanSpeed::level(v).unwrap();
            assert_eq!(speed.to_wire().len(), 4);
            assert_eq!(speed.to_wire().parse::<FanSpeed>().unwrap(), speed);
        }
        assert_eq!(FanSpeed::level(10).unwrap().to_wire(), "0010");
    }

    #[test]
    fn speed_out_of_range() {
        assert!(FanSpeed::level(0).is_err());
        assert!(FanSpeed::level(11).is_err());
        assert!("0011".parse::<FanSpeed>().is_err());
        assert!("FAST".parse::<FanSpeed>().is_err());
    }

    #[test]
    fn auto_speed_has_no_level() {
        assert_eq!(FanSpeed::Auto.value(), None);
        assert_eq!(FanSpeed::Auto.to_wire(), "AUTO");
    }

    #[test]
    fn quality_target_codes() {
        assert_eq!(QualityTarget::Better.as_str(), "0001");
        assert_eq!("0003".parse::<QualityTarget>(), Ok(QualityTarget::High));
        assert!("0002".parse::<QualityTarget>().is_err());
    }

    #[test]
    fn fan_mode_rejects_unknown() {
        assert!("fan".parse::<FanMode>().is_err());
    }
}
