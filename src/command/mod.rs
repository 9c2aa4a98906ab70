// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound device commands.
//!
//! Every command is a JSON object published on the device's command topic:
//!
//! | Message | Purpose | Family |
//! |---------|---------|--------|
//! | `STATE-SET` | Change settings | all |
//! | `REQUEST-CURRENT-STATE` | Ask for a full snapshot | all |
//! | `REQUEST-PRODUCT-ENVIRONMENT-CURRENT-SENSOR-DATA` | Ask for sensor readings | fans |
//! | `START`, `PAUSE`, `RESUME`, `ABORT` | Cleaning lifecycle | 360 Eye |
//!
//! User-facing settings go through [`Configuration`], which validates them
//! against the product family before anything is sent.
//!
//! # Examples
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use purelink::command::{Configuration, OutboundCommand};
//! use purelink::types::{FanSpeed, ProductType};
//!
//! let now = Utc.with_ymd_and_hms(2017, 6, 20, 12, 0, 0).unwrap();
//!
//! let command = Configuration::new()
//!     .with_speed(FanSpeed::level(4).unwrap())
//!     .build(&ProductType::PureCoolLinkTower, "AB1-EU-HEA1234A", None, now)
//!     .unwrap();
//!
//! let payload: serde_json::Value = serde_json::from_slice(&command.encode()).unwrap();
//! assert_eq!(payload["msg"], "STATE-SET");
//! assert_eq!(payload["time"], "2017-06-20T12:00:00Z");
//! assert_eq!(payload["data"]["fnsp"], "0004");
//!
//! let refresh = OutboundCommand::request_current_state("AB1-EU-HEA1234A", now);
//! assert_eq!(refresh.message_type().as_str(), "REQUEST-CURRENT-STATE");
//! ```

mod configuration;

pub use configuration::{Configuration, VacuumCommand};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::protocol::Delivery;
use crate::telemetry::TIME_FORMAT;

/// Outbound message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Change settings.
    StateSet,
    /// Ask for a full state snapshot.
    RequestCurrentState,
    /// Ask for environmental sensor readings.
    RequestEnvironmentalSensorData,
    /// Start a clean.
    Start,
    /// Pause the running clean.
    Pause,
    /// Resume a paused clean.
    Resume,
    /// Abort the clean.
    Abort,
}

impl MessageType {
    /// Returns the wire `msg` tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StateSet => "STATE-SET",
            Self::RequestCurrentState => "REQUEST-CURRENT-STATE",
            Self::RequestEnvironmentalSensorData => {
                "REQUEST-PRODUCT-ENVIRONMENT-CURRENT-SENSOR-DATA"
            }
            Self::Start => "START",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::Abort => "ABORT",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command ready to publish.
///
/// Built once per call and consumed by a single publish.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCommand {
    target_serial: String,
    message_type: MessageType,
    fields: Map<String, Value>,
    timestamp: DateTime<Utc>,
    mode_reason: Option<&'static str>,
    delivery: Delivery,
}

impl OutboundCommand {
    pub(crate) fn new(
        target_serial: impl Into<String>,
        message_type: MessageType,
        fields: Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            target_serial: target_serial.into(),
            message_type,
            fields,
            timestamp,
            mode_reason: None,
            delivery: Delivery::AtLeastOnce,
        }
    }

    pub(crate) fn with_mode_reason(mut self, reason: &'static str) -> Self {
        self.mode_reason = Some(reason);
        self
    }

    fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Asks the device for a full state snapshot.
    #[must_use]
    pub fn request_current_state(serial: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(serial, MessageType::RequestCurrentState, Map::new(), now)
            .with_delivery(Delivery::AtMostOnce)
    }

    /// Asks a fan for its environmental sensor readings.
    #[must_use]
    pub fn request_environmental_data(serial: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(serial, MessageType::RequestEnvironmentalSensorData, Map::new(), now)
            .with_delivery(Delivery::AtMostOnce)
    }

    /// Serial of the device the command is for.
    #[must_use]
    pub fn target_serial(&self) -> &str {
        &self.target_serial
    }

    /// Message type.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Command fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Creation time, sent as `time`.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Delivery guarantee requested from the transport.
    #[must_use]
    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Encodes the command as a JSON payload.
    ///
    /// `STATE-SET` fields go under `data`; lifecycle fields sit at the top level.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Map::new();
        payload.insert("msg".to_string(), self.message_type.as_str().into());
        payload.insert(
            "time".to_string(),
            self.timestamp.format(TIME_FORMAT).to_string().into(),
        );
        if let Some(reason) = self.mode_reason {
            payload.insert("mode-reason".to_string(), reason.into());
        }

        if self.message_type == MessageType::StateSet {
            payload.insert("data".to_string(), Value::Object(self.fields.clone()));
        } else {
            payload.extend(self.fields.clone());
        }

        Value::Object(payload).to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 6, 20, 12, 0, 0).unwrap()
    }

    fn decode(command: &OutboundCommand) -> Value {
        serde_json::from_slice(&command.encode()).unwrap()
    }

    #[test]
    fn request_current_state_payload() {
        let command = OutboundCommand::request_current_state("SERIAL", now());
        assert_eq!(command.delivery(), Delivery::AtMostOnce);
        assert_eq!(
            decode(&command),
            serde_json::json!({"msg": "REQUEST-CURRENT-STATE", "time": "2017-06-20T12:00:00Z"})
        );
    }

    #[test]
    fn environmental_request_payload() {
        let command = OutboundCommand::request_environmental_data("SERIAL", now());
        assert_eq!(
            decode(&command)["msg"],
            "REQUEST-PRODUCT-ENVIRONMENT-CURRENT-SENSOR-DATA"
        );
    }

    #[test]
    fn lifecycle_fields_are_top_level() {
        let mut fields = Map::new();
        fields.insert("fullCleanType".to_string(), "immediate".into());
        let command = OutboundCommand::new("SERIAL", MessageType::Start, fields, now());
        let payload = decode(&command);
        assert_eq!(payload["fullCleanType"], "immediate");
        assert!(payload.get("data").is_none());
        assert!(payload.get("mode-reason").is_none());
    }

    #[test]
    fn state_set_fields_under_data() {
        let mut fields = Map::new();
        fields.insert("fmod".to_string(), "FAN".into());
        let command = OutboundCommand::new("SERIAL", MessageType::StateSet, fields, now())
            .with_mode_reason("LAPP");
        let payload = decode(&command);
        assert_eq!(payload["mode-reason"], "LAPP");
        assert_eq!(payload["data"]["fmod"], "FAN");
        assert_eq!(command.delivery(), Delivery::AtLeastOnce);
    }
}
