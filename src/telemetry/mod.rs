// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoding of inbound device messages.
//!
//! Every payload a Dyson device publishes is a JSON object tagged by its
//! `msg` field:
//!
//! - `CURRENT-STATE` / `STATE-CHANGE` - full snapshot or delta of the device state
//! - `ENVIRONMENTAL-CURRENT-SENSOR-DATA` - sensor readings (fans)
//! - `TELEMETRY-DATA`, `MAP-GLOBAL`, `MAP-GRID`, `MAP-DATA`, `GOODBYE`,
//!   `CURRENT-FAULTS` - 360 Eye telemetry
//!
//! Unknown message types decode to [`InboundMessage::Unrecognized`] so that
//! firmware updates never break the session.
//!
//! # Examples
//!
//! ```
//! use purelink::telemetry::{decode, InboundMessage, ReportedFields};
//!
//! let payload = br#"{"msg":"CURRENT-STATE","time":"2017-06-20T12:00:00Z",
//!     "product-state":{"fmod":"FAN","fnsp":"0002"}}"#;
//!
//! match decode(payload).unwrap() {
//!     InboundMessage::CurrentState(report) => {
//!         let ReportedFields::Fan(fields) = report.fields else { panic!() };
//!         assert_eq!(fields.speed.and_then(|s| s.value()), Some(2));
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod product_state;
mod robot;

pub use product_state::{EnvironmentalReading, FanFields};
pub use robot::{
    FaultReport, Goodbye, MapContent, MapData, MapGlobal, MapGrid, TelemetryData, VacuumFields,
};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Wire timestamp format used in both directions.
pub(crate) const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Full state snapshot.
    CurrentState(StateReport),
    /// Changed fields only.
    StateChange(StateReport),
    /// A `STATE-SET` command seen on the wire, for example when another client
    /// shares the command topic. Carries the requested fields.
    StateSet(StateReport),
    /// Fan environmental sensor readings.
    EnvironmentalSensorData(EnvironmentalReading),
    /// 360 Eye fault report.
    Fault(FaultReport),
    /// 360 Eye telemetry record.
    Telemetry(TelemetryData),
    /// 360 Eye global map position update.
    MapGlobal(MapGlobal),
    /// 360 Eye map tile announcement.
    MapGrid(MapGrid),
    /// 360 Eye map tile content.
    MapData(MapData),
    /// 360 Eye is going offline.
    Goodbye(Goodbye),
    /// A message type this library does not know.
    Unrecognized {
        /// The `msg` tag.
        msg_type: String,
        /// The complete payload.
        raw: Value,
    },
}

impl InboundMessage {
    /// Returns the wire `msg` tag of this message.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        match self {
            Self::CurrentState(_) => "CURRENT-STATE",
            Self::StateChange(_) => "STATE-CHANGE",
            Self::StateSet(_) => "STATE-SET",
            Self::EnvironmentalSensorData(_) => "ENVIRONMENTAL-CURRENT-SENSOR-DATA",
            Self::Fault(_) => "CURRENT-FAULTS",
            Self::Telemetry(_) => "TELEMETRY-DATA",
            Self::MapGlobal(_) => "MAP-GLOBAL",
            Self::MapGrid(_) => "MAP-GRID",
            Self::MapData(_) => "MAP-DATA",
            Self::Goodbye(_) => "GOODBYE",
            Self::Unrecognized { msg_type, .. } => msg_type,
        }
    }
}

/// State fields of a `CURRENT-STATE`, `STATE-CHANGE` or `STATE-SET` message.
#[derive(Debug, Clone, PartialEq)]
pub struct StateReport {
    /// Device timestamp, if present and parsable.
    pub time: Option<DateTime<Utc>>,
    /// Decoded fields.
    pub fields: ReportedFields,
}

/// Family-specific state fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportedFields {
    /// Fan (`product-state`) fields.
    Fan(FanFields),
    /// 360 Eye fields.
    Vacuum(VacuumFields),
}

/// Decodes a raw payload.
///
/// # Errors
///
/// Returns `ParseError` if the payload is not a JSON object with a `msg`
/// string, or if a known message type carries malformed fields.
pub fn decode(payload: &[u8]) -> Result<InboundMessage, ParseError> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Object(object) = value else {
        return Err(ParseError::NotAnObject);
    };

    let msg_type = object
        .get("msg")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::MissingField("msg".to_string()))?
        .to_string();
    let time = object.get("time").and_then(Value::as_str).and_then(parse_time);

    let message = match msg_type.as_str() {
        "CURRENT-STATE" => InboundMessage::CurrentState(state_report(&object, time)?),
        "STATE-CHANGE" => InboundMessage::StateChange(state_report(&object, time)?),
        "STATE-SET" => InboundMessage::StateSet(state_set_report(&object, time)?),
        "ENVIRONMENTAL-CURRENT-SENSOR-DATA" => {
            let data = object
                .get("data")
                .and_then(Value::as_object)
                .ok_or_else(|| ParseError::MissingField("data".to_string()))?;
            InboundMessage::EnvironmentalSensorData(EnvironmentalReading::parse(data, time)?)
        }
        "CURRENT-FAULTS" => InboundMessage::Fault(FaultReport::parse(&object, time)),
        "TELEMETRY-DATA" => InboundMessage::Telemetry(robot::parse(object)?),
        "MAP-GLOBAL" => InboundMessage::MapGlobal(robot::parse(object)?),
        "MAP-GRID" => InboundMessage::MapGrid(robot::parse(object)?),
        "MAP-DATA" => InboundMessage::MapData(robot::parse(object)?),
        "GOODBYE" => InboundMessage::Goodbye(robot::parse(object)?),
        _ => InboundMessage::Unrecognized {
            msg_type,
            raw: Value::Object(object),
        },
    };

    Ok(message)
}

fn state_report(
    object: &Map<String, Value>,
    time: Option<DateTime<Utc>>,
) -> Result<StateReport, ParseError> {
    let fields = if let Some(product_state) = object.get("product-state") {
        let state = product_state
            .as_object()
            .ok_or_else(|| ParseError::InvalidValue {
                field: "product-state".to_string(),
                message: "expected an object".to_string(),
            })?;
        ReportedFields::Fan(FanFields::parse(state)?)
    } else if object.contains_key("state") || object.contains_key("newstate") {
        ReportedFields::Vacuum(VacuumFields::parse(object)?)
    } else {
        return Err(ParseError::MissingField("product-state".to_string()));
    };

    Ok(StateReport { time, fields })
}

fn state_set_report(
    object: &Map<String, Value>,
    time: Option<DateTime<Utc>>,
) -> Result<StateReport, ParseError> {
    let data = object
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| ParseError::MissingField("data".to_string()))?;

    let fields = if data.contains_key("defaultVacuumPowerMode") {
        ReportedFields::Vacuum(VacuumFields::parse_requested(data))
    } else {
        ReportedFields::Fan(FanFields::parse(data)?)
    };

    Ok(StateReport { time, fields })
}

/// Parses a device timestamp. Malformed timestamps are dropped, not fatal.
pub(crate) fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// A scalar as found in device payloads: usually a string, sometimes a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl Scalar {
    pub(crate) fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
            Self::Flag(flag) => flag.to_string(),
        }
    }
}

/// A `product-state` value: either the value itself or an `[old, new]` pair.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Reported {
    Value(Scalar),
    Change(Vec<Scalar>),
}

impl Reported {
    /// Returns the current value as text, taking the new side of a change pair.
    pub(crate) fn current(self) -> Option<String> {
        match self {
            Self::Value(scalar) => Some(scalar.into_text()),
            Self::Change(mut pair) => pair.pop().map(Scalar::into_text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FanMode, PowerMode};

    #[test]
    fn unknown_message_is_unrecognized() {
        let payload = br#"{"msg":"SOME-FUTURE-TYPE","time":"2017-06-20T12:00:00Z","x":1}"#;
        let message = decode(payload).unwrap();
        assert_eq!(message.msg_type(), "SOME-FUTURE-TYPE");
        match message {
            InboundMessage::Unrecognized { raw, .. } => assert_eq!(raw["x"], 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_payloads_fail() {
        assert!(matches!(decode(b"{not json"), Err(ParseError::Json(_))));
        assert!(matches!(decode(b"[1,2]"), Err(ParseError::NotAnObject)));
        assert!(matches!(decode(br#"{"time":"x"}"#), Err(ParseError::MissingField(_))));
    }

    #[test]
    fn state_change_takes_new_value() {
        let payload = br#"{"msg":"STATE-CHANGE","time":"2017-06-20T12:00:00Z",
            "product-state":{"fmod":["AUTO","FAN"],"fnsp":["AUTO","0004"]}}"#;
        let InboundMessage::StateChange(report) = decode(payload).unwrap() else {
            panic!("expected state change");
        };
        let ReportedFields::Fan(fields) = report.fields else {
            panic!("expected fan fields");
        };
        assert_eq!(fields.fan_mode, Some(FanMode::Fan));
        assert_eq!(fields.speed.and_then(|s| s.value()), Some(4));
        assert_eq!(fields.oscillation, None);
        assert!(report.time.is_some());
    }

    #[test]
    fn vacuum_state_detected() {
        let payload = br#"{"msg":"CURRENT-STATE","time":"2017-02-19T22:03:08Z",
            "state":"FULL_CLEAN_RUNNING","fullCleanType":"immediate",
            "globalPosition":[1,2],"currentVacuumPowerMode":"fullPower",
            "cleanId":"abc","batteryChargeLevel":81}"#;
        let InboundMessage::CurrentState(report) = decode(payload).unwrap() else {
            panic!("expected current state");
        };
        let ReportedFields::Vacuum(fields) = report.fields else {
            panic!("expected vacuum fields");
        };
        assert_eq!(fields.power_mode, Some(PowerMode::Max));
        assert_eq!(fields.battery_level, Some(81));
    }

    #[test]
    fn state_without_fields_fails() {
        let payload = br#"{"msg":"CURRENT-STATE","time":"2017-06-20T12:00:00Z"}"#;
        assert!(decode(payload).is_err());
    }

    #[test]
    fn timestamps() {
        assert!(parse_time("2017-06-20T12:00:00Z").is_some());
        assert!(parse_time("2017-06-20T12:00:00.123Z").is_some());
        assert!(parse_time("yesterday").is_none());
    }
}
