// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parser for fan `product-state` and environmental sensor payloads.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::Reported;
use crate::error::ParseError;
use crate::types::{
    FanMode, FanSpeed, HeatMode, HeatTarget, QualityTarget, SleepTimer, parse_on_off,
    parse_padded,
};

/// Value meaning "leave unchanged" in `STATE-SET` payloads.
const UNCHANGED: &str = "STET";

/// Raw `product-state` object as sent by the device.
#[derive(Debug, Default, Deserialize)]
struct RawProductState {
    fmod: Option<Reported>,
    fnst: Option<Reported>,
    fnsp: Option<Reported>,
    oson: Option<Reported>,
    nmod: Option<Reported>,
    filf: Option<Reported>,
    qtar: Option<Reported>,
    rhtm: Option<Reported>,
    sltm: Option<Reported>,
    rstf: Option<Reported>,
    hmod: Option<Reported>,
    hmax: Option<Reported>,
    hsta: Option<Reported>,
    ffoc: Option<Reported>,
    tilt: Option<Reported>,
}

/// Fan state fields present in a payload.
///
/// Every field is optional: `STATE-CHANGE` messages only carry what changed,
/// and the base fan family never reports the heating fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanFields {
    /// Operating mode (`fmod`).
    pub fan_mode: Option<FanMode>,
    /// Whether the motor is running (`fnst`).
    pub fan_running: Option<bool>,
    /// Fan speed (`fnsp`).
    pub speed: Option<FanSpeed>,
    /// Oscillation (`oson`).
    pub oscillation: Option<bool>,
    /// Night mode (`nmod`).
    pub night_mode: Option<bool>,
    /// Remaining filter life in hours (`filf`).
    pub filter_life: Option<u16>,
    /// Air quality target (`qtar`).
    pub quality_target: Option<QualityTarget>,
    /// Air quality monitoring while in standby (`rhtm`).
    pub standby_monitoring: Option<bool>,
    /// Sleep timer (`sltm`).
    pub sleep_timer: Option<SleepTimer>,
    /// Filter life reset requested (`rstf`), only seen in `STATE-SET`.
    pub reset_filter: Option<bool>,
    /// Heating mode (`hmod`).
    pub heat_mode: Option<HeatMode>,
    /// Heating target (`hmax`).
    pub heat_target: Option<HeatTarget>,
    /// Whether the heater is currently heating (`hsta`).
    pub heating_active: Option<bool>,
    /// Focused (narrow) airflow (`ffoc`).
    pub focus_mode: Option<bool>,
    /// Whether the device reports being tilted (`tilt`).
    pub tilted: Option<bool>,
}

impl FanFields {
    /// Parses a `product-state` (or `STATE-SET` `data`) object.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if a known field carries a value outside its domain.
    pub fn parse(object: &Map<String, Value>) -> Result<Self, ParseError> {
        let raw: RawProductState = serde_json::from_value(Value::Object(object.clone()))?;

        Ok(Self {
            fan_mode: field(raw.fmod, |v| v.parse())?,
            fan_running: field(raw.fnst, |v| match v {
                "FAN" => Ok(true),
                "OFF" => Ok(false),
                _ => Err(invalid("fnst", v)),
            })?,
            speed: field(raw.fnsp, |v| v.parse())?,
            oscillation: field(raw.oson, |v| parse_on_off("oson", v))?,
            night_mode: field(raw.nmod, |v| parse_on_off("nmod", v))?,
            filter_life: field(raw.filf, |v| parse_padded("filf", v))?,
            quality_target: field(raw.qtar, |v| v.parse())?,
            standby_monitoring: field(raw.rhtm, |v| parse_on_off("rhtm", v))?,
            sleep_timer: field(raw.sltm, |v| v.parse())?,
            reset_filter: field(raw.rstf, |v| match v {
                "RSTF" => Ok(true),
                _ => Err(invalid("rstf", v)),
            })?,
            heat_mode: field(raw.hmod, |v| v.parse())?,
            heat_target: field(raw.hmax, |v| v.parse())?,
            heating_active: field(raw.hsta, |v| match v {
                "HEAT" => Ok(true),
                "OFF" => Ok(false),
                _ => Err(invalid("hsta", v)),
            })?,
            focus_mode: field(raw.ffoc, |v| parse_on_off("ffoc", v))?,
            tilted: field(raw.tilt, |v| match v {
                "TILT" => Ok(true),
                "OK" => Ok(false),
                _ => Err(invalid("tilt", v)),
            })?,
        })
    }

    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn invalid(field: &'static str, value: &str) -> crate::error::ValueError {
    crate::error::ValueError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

/// Extracts and converts one reported field; `STET` counts as absent.
fn field<T, F>(raw: Option<Reported>, convert: F) -> Result<Option<T>, ParseError>
where
    F: FnOnce(&str) -> Result<T, crate::error::ValueError>,
{
    match raw.and_then(Reported::current) {
        Some(value) if value == UNCHANGED => Ok(None),
        Some(value) => convert(&value).map(Some).map_err(Into::into),
        None => Ok(None),
    }
}

/// Environmental sensor readings.
///
/// Sensors that are off or still warming up report sentinels (`OFF`, `INIT`);
/// these decode to `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentalReading {
    /// Device timestamp.
    pub time: Option<DateTime<Utc>>,
    /// Relative humidity in percent (`hact`).
    pub humidity: Option<u8>,
    /// Temperature in kelvin (`tact`, sent in tenths of a kelvin).
    pub temperature: Option<f32>,
    /// Volatile organic compounds index (`vact`).
    pub volatile_compounds: Option<u16>,
    /// Particulate index (`pact`).
    pub dust: Option<u16>,
    /// Remaining sleep timer (`sltm`).
    pub sleep_timer: Option<SleepTimer>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEnvironment {
    hact: Option<Reported>,
    tact: Option<Reported>,
    vact: Option<Reported>,
    pact: Option<Reported>,
    sltm: Option<Reported>,
}

impl EnvironmentalReading {
    /// Parses the `data` object of an environmental message.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if a reading is neither a sentinel nor a number.
    pub fn parse(data: &Map<String, Value>, time: Option<DateTime<Utc>>) -> Result<Self, ParseError> {
        let raw: RawEnvironment = serde_json::from_value(Value::Object(data.clone()))?;

        let humidity = sensor(raw.hact, "hact")?
            .map(|v| u8::try_from(v).map_err(|_| out_of_range("hact", v)))
            .transpose()?;
        let temperature = sensor(raw.tact, "tact")?.map(|v| f32::from(v) / 10.0);

        Ok(Self {
            time,
            humidity,
            temperature,
            volatile_compounds: sensor(raw.vact, "vact")?,
            dust: sensor(raw.pact, "pact")?,
            sleep_timer: field(raw.sltm, |v| v.parse())?,
        })
    }
}

fn sensor(raw: Option<Reported>, name: &'static str) -> Result<Option<u16>, ParseError> {
    match raw.and_then(Reported::current) {
        Some(value) if value == "OFF" || value == "INIT" => Ok(None),
        Some(value) => parse_padded(name, &value).map(Some).map_err(Into::into),
        None => Ok(None),
    }
}

fn out_of_range(field: &str, value: u16) -> ParseError {
    ParseError::InvalidValue {
        field: field.to_string(),
        message: format!("{value} is out of range"),
    }
}
