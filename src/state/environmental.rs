// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environmental sensor snapshot.

use chrono::{DateTime, Utc};

use crate::telemetry::EnvironmentalReading;
use crate::types::SleepTimer;

/// Kelvin offset used by the devices (whole degrees).
const KELVIN_OFFSET: f32 = 273.0;

/// Last known environmental readings of a fan.
///
/// A missing value means the sensor is off or still warming up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentalState {
    humidity: Option<u8>,
    temperature: Option<f32>,
    volatile_compounds: Option<u16>,
    dust: Option<u16>,
    sleep_timer: Option<SleepTimer>,
    reported_at: Option<DateTime<Utc>>,
}

impl EnvironmentalState {
    /// Relative humidity in percent.
    #[must_use]
    pub fn humidity(&self) -> Option<u8> {
        self.humidity
    }

    /// Temperature in kelvin.
    #[must_use]
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Temperature in degrees Celsius.
    #[must_use]
    pub fn temperature_celsius(&self) -> Option<f32> {
        self.temperature.map(|k| k - KELVIN_OFFSET)
    }

    /// Volatile organic compounds index.
    #[must_use]
    pub fn volatile_compounds(&self) -> Option<u16> {
        self.volatile_compounds
    }

    /// Particulate index.
    #[must_use]
    pub fn dust(&self) -> Option<u16> {
        self.dust
    }

    /// Remaining sleep timer.
    #[must_use]
    pub fn sleep_timer(&self) -> Option<SleepTimer> {
        self.sleep_timer
    }

    /// Device timestamp of the reading.
    #[must_use]
    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        self.reported_at
    }
}

impl From<EnvironmentalReading> for EnvironmentalState {
    fn from(reading: EnvironmentalReading) -> Self {
        Self {
            humidity: reading.humidity,
            temperature: reading.temperature,
            volatile_compounds: reading.volatile_compounds,
            dust: reading.dust,
            sleep_timer: reading.sleep_timer,
            reported_at: reading.time,
        }
    }
}
