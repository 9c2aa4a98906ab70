// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sleep timer type.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// Sleep timer in minutes (`sltm`). Zero means the timer is disabled.
///
/// Outbound the device takes the minute count as a JSON integer; inbound it
/// reports either `"OFF"` or a zero-padded minute count.
///
/// # Examples
///
/// ```
/// use purelink::types::SleepTimer;
///
/// let timer = SleepTimer::minutes(90).unwrap();
/// assert_eq!(timer.value(), 90);
/// assert!(SleepTimer::OFF.is_off());
/// assert_eq!("OFF".parse::<SleepTimer>().unwrap(), SleepTimer::OFF);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SleepTimer(u16);

impl SleepTimer {
    /// Longest timer accepted by the devices (9 hours).
    pub const MAX: u16 = 540;

    /// Disabled timer.
    pub const OFF: Self = Self(0);

    /// Creates a timer.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is above 540.
    pub fn minutes(value: u16) -> Result<Self, ValueError> {
        if value > Self::MAX {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: Self::MAX,
                actual: value,
            });
        }
        Ok(Self(value))
    }

    /// Returns the minute count.
    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Returns true if the timer is disabled.
    #[must_use]
    pub const fn is_off(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SleepTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_off() {
            f.write_str("off")
        } else {
            write!(f, "{} min", self.0)
        }
    }
}

impl FromStr for SleepTimer {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "OFF" {
            return Ok(Self::OFF);
        }
        // Reported remaining time is not clamped to MAX.
        super::parse_padded("sltm", s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_range() {
        assert!(SleepTimer::minutes(540).is_ok());
        assert!(SleepTimer::minutes(541).is_err());
    }

    #[test]
    fn parses_reported_values() {
        assert_eq!("0028".parse::<SleepTimer>().unwrap().value(), 28);
        assert!("OFF".parse::<SleepTimer>().unwrap().is_off());
        assert!("SOON".parse::<SleepTimer>().is_err());
    }
}
