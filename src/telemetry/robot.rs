// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsers for 360 Eye messages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::{Scalar, parse_time};
use crate::error::ParseError;
use crate::types::{Position, PowerMode, RobotMode};

/// Deserializes a typed robot message from its payload object.
pub(super) fn parse<T: DeserializeOwned>(object: Map<String, Value>) -> Result<T, ParseError> {
    Ok(serde_json::from_value(Value::Object(object))?)
}

fn de_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_time))
}

fn de_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(Scalar::into_text)
}

fn de_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_text))
}

fn de_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let text = de_text(deserializer)?;
    text.trim()
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("expected a number, got {text:?}")))
}

fn de_anchor<'de, D>(deserializer: D) -> Result<Option<Position>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Scalar>>::deserialize(deserializer)?;
    Ok(raw.and_then(to_position))
}

/// Converts an `[x, y]` pair, truncating fractional coordinates.
#[allow(clippy::cast_possible_truncation)]
fn to_position(pair: Vec<Scalar>) -> Option<Position> {
    let [x, y]: [Scalar; 2] = pair.try_into().ok()?;
    let coordinate = |s: Scalar| s.into_text().trim().parse::<f64>().ok().map(|v| v as i32);
    Some(Position {
        x: coordinate(x)?,
        y: coordinate(y)?,
    })
}

/// 360 Eye state fields from `CURRENT-STATE` / `STATE-CHANGE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VacuumFields {
    /// Robot mode (`state`, or `newstate` in a change).
    pub mode: Option<RobotMode>,
    /// Clean type (`fullCleanType`), e.g. `immediate`.
    pub full_clean_type: Option<String>,
    /// Position on the global map (`globalPosition`).
    pub position: Option<Position>,
    /// Suction power (`currentVacuumPowerMode`, or `defaultVacuumPowerMode` in `STATE-SET`).
    pub power_mode: Option<PowerMode>,
    /// Cleaning session identifier (`cleanId`).
    pub clean_id: Option<String>,
    /// Battery level in percent (`batteryChargeLevel`).
    pub battery_level: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVacuumState {
    state: Option<String>,
    newstate: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    full_clean_type: Option<String>,
    global_position: Option<Vec<Scalar>>,
    current_vacuum_power_mode: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    clean_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    battery_charge_level: Option<String>,
}

impl VacuumFields {
    /// Parses a state message object.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if a field has the wrong shape or the battery
    /// level is not a percentage.
    pub fn parse(object: &Map<String, Value>) -> Result<Self, ParseError> {
        let raw: RawVacuumState = serde_json::from_value(Value::Object(object.clone()))?;

        let mode = raw.newstate.or(raw.state).map(|s| {
            let mode = RobotMode::from_wire(&s);
            if let RobotMode::Unknown(ref value) = mode {
                tracing::warn!(state = %value, "Unknown robot state value");
            }
            mode
        });

        let battery_level = raw
            .battery_charge_level
            .map(|level| {
                level
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|v| *v <= 100)
                    .ok_or(ParseError::InvalidValue {
                        field: "batteryChargeLevel".to_string(),
                        message: format!("{level:?} is not a percentage"),
                    })
            })
            .transpose()?;

        Ok(Self {
            mode,
            full_clean_type: raw.full_clean_type,
            position: raw.global_position.and_then(to_position),
            power_mode: raw.current_vacuum_power_mode.as_deref().map(PowerMode::from_wire),
            clean_id: raw.clean_id,
            battery_level,
        })
    }

    /// Parses the `data` object of a `STATE-SET` command.
    pub(super) fn parse_requested(data: &Map<String, Value>) -> Self {
        Self {
            power_mode: data
                .get("defaultVacuumPowerMode")
                .and_then(Value::as_str)
                .map(PowerMode::from_wire),
            ..Self::default()
        }
    }
}

/// `TELEMETRY-DATA` record. The meaning of the fields is not documented.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelemetryData {
    /// Record identifier.
    #[serde(deserialize_with = "de_text")]
    pub id: String,
    /// First value.
    #[serde(default, deserialize_with = "de_opt_text")]
    pub field1: Option<String>,
    /// Second value.
    #[serde(default, deserialize_with = "de_opt_text")]
    pub field2: Option<String>,
    /// Third value.
    #[serde(default, deserialize_with = "de_opt_text")]
    pub field3: Option<String>,
    /// Fourth value.
    #[serde(default, deserialize_with = "de_opt_text")]
    pub field4: Option<String>,
    /// Device timestamp.
    #[serde(default, deserialize_with = "de_time")]
    pub time: Option<DateTime<Utc>>,
}

/// `MAP-GLOBAL`: robot pose on the global map. Closes a map revision.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapGlobal {
    /// Grid the pose refers to.
    #[serde(rename = "gridID", deserialize_with = "de_text")]
    pub grid_id: String,
    /// Cleaning session.
    #[serde(rename = "cleanId", deserialize_with = "de_text")]
    pub clean_id: String,
    /// Horizontal position.
    #[serde(deserialize_with = "de_number")]
    pub x: f64,
    /// Vertical position.
    #[serde(deserialize_with = "de_number")]
    pub y: f64,
    /// Heading.
    #[serde(deserialize_with = "de_number")]
    pub angle: f64,
    /// Device timestamp.
    #[serde(default, deserialize_with = "de_time")]
    pub time: Option<DateTime<Utc>>,
}

/// `MAP-GRID`: announces one map tile and where it sits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapGrid {
    /// Tile identifier.
    #[serde(rename = "gridID", deserialize_with = "de_text")]
    pub grid_id: String,
    /// Cleaning session.
    #[serde(rename = "cleanId", deserialize_with = "de_text")]
    pub clean_id: String,
    /// Cell size.
    #[serde(deserialize_with = "de_number")]
    pub resolution: f64,
    /// Tile width in cells.
    #[serde(deserialize_with = "de_number")]
    pub width: f64,
    /// Tile height in cells.
    #[serde(deserialize_with = "de_number")]
    pub height: f64,
    /// Tile position on the global map.
    #[serde(default, deserialize_with = "de_anchor")]
    pub anchor: Option<Position>,
    /// Device timestamp.
    #[serde(default, deserialize_with = "de_time")]
    pub time: Option<DateTime<Utc>>,
}

/// Encoded tile content carried by `MAP-DATA`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapContent {
    /// MIME type of the content.
    #[serde(rename = "content-type")]
    pub content_type: String,
    /// Transfer encoding of the content.
    #[serde(rename = "content-encoding")]
    pub content_encoding: String,
    /// Encoded content.
    pub content: String,
}

/// `MAP-DATA`: content of one map tile.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapData {
    /// Tile identifier.
    #[serde(rename = "gridID", deserialize_with = "de_text")]
    pub grid_id: String,
    /// Cleaning session.
    #[serde(rename = "cleanId", deserialize_with = "de_text")]
    pub clean_id: String,
    /// Tile content.
    pub data: MapContent,
    /// Device timestamp.
    #[serde(default, deserialize_with = "de_time")]
    pub time: Option<DateTime<Utc>>,
}

/// `GOODBYE`: the robot is going offline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Goodbye {
    /// Reason given by the robot.
    #[serde(deserialize_with = "de_text")]
    pub reason: String,
    /// Device timestamp.
    #[serde(default, deserialize_with = "de_time")]
    pub time: Option<DateTime<Utc>>,
}

/// `CURRENT-FAULTS`: fault flags reported by the robot.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultReport {
    /// Every field of the payload except `msg` and `time`.
    pub faults: BTreeMap<String, Value>,
    /// Device timestamp.
    pub time: Option<DateTime<Utc>>,
}

impl FaultReport {
    pub(super) fn parse(object: &Map<String, Value>, time: Option<DateTime<Utc>>) -> Self {
        let faults = object
            .iter()
            .filter(|(key, _)| key.as_str() != "msg" && key.as_str() != "time")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self { faults, time }
    }
}
