// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `purelink` library.
//!
//! This module provides the error hierarchy for every layer of the engine:
//! credential decryption, value validation, command building, the MQTT
//! session, discovery, payload decoding, and device lifecycle checks.

use thiserror::Error;

/// The main error type for this library.
///
/// Each variant wraps the error of one concern so callers can match on the
/// layer that failed, or simply propagate with `?`.
#[derive(Debug, Error)]
pub enum Error {
    /// The encrypted local credential could not be decrypted.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The requested configuration cannot be expressed as a device command.
    #[error("invalid command: {0}")]
    Command(#[from] CommandError),

    /// Error occurred during session communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device could not be located on the network.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Error occurred while decoding a device payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred during device operations.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Errors raised while decrypting the local credential blob.
///
/// These are fatal for the device record: retrying will not help until the
/// account service supplies a new blob.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The blob is not valid base64.
    #[error("credential is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The ciphertext length is not a positive multiple of the block size.
    #[error("ciphertext length {0} is not a multiple of 16")]
    CipherLength(usize),

    /// The decrypted plaintext has an invalid padding trailer.
    #[error("invalid padding in decrypted credential")]
    Padding,

    /// The plaintext is not the expected JSON document.
    #[error("decrypted credential is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The plaintext JSON lacks the password field.
    #[error("decrypted credential has no {0} field")]
    MissingField(&'static str),
}

/// Errors related to value validation and constraints.
///
/// These errors occur when attempting to create constrained types
/// with invalid values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u16,
        /// Maximum allowed value.
        max: u16,
        /// The actual value that was provided.
        actual: u16,
    },

    /// A string does not name a known value for the field.
    #[error("invalid {field} value: {value}")]
    InvalidValue {
        /// The wire field being parsed.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Errors raised when a configuration cannot become an outbound command.
///
/// Returned synchronously; nothing is published when one of these occurs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// An option is not supported by the device family.
    #[error("{option} is not supported by {family}")]
    Unsupported {
        /// Option that was set.
        option: &'static str,
        /// Family that rejected it.
        family: &'static str,
    },

    /// The configuration does not set any option.
    #[error("configuration is empty")]
    Empty,

    /// A lifecycle command was combined with other options.
    #[error("lifecycle command {0} cannot be combined with other options")]
    Conflicting(&'static str),
}

/// Errors related to the MQTT session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the device failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The device refused the serial/password pair.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Operation requires a subscribed session.
    #[error("device is not connected")]
    NotConnected,

    /// A session is already active for this device.
    #[error("device is already connected")]
    AlreadyConnected,

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors raised while locating a device.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No advertisement for the serial was seen before the timeout.
    #[error("device {serial} not found on the local network")]
    NotFound {
        /// The serial that was searched for.
        serial: String,
    },

    /// A manually supplied address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The discovery socket could not be set up.
    #[error("discovery socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to decoding device payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// Expected field is missing from the payload.
    #[error("missing field in payload: {0}")]
    MissingField(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

impl From<ValueError> for ParseError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::InvalidValue { field, value } => Self::InvalidValue {
                field: field.to_string(),
                message: format!("unknown value {value:?}"),
            },
            ValueError::OutOfRange { .. } => Self::InvalidValue {
                field: "value".to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Errors related to device operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// A vacuum lifecycle command is not valid in the current cleaning phase.
    #[error("cannot {command} while {phase}")]
    InvalidTransition {
        /// Command that was requested.
        command: &'static str,
        /// Phase the robot was in.
        phase: String,
    },

    /// The operation does not apply to this product type.
    #[error("{operation} is not available for {product}")]
    UnsupportedProduct {
        /// Operation that was requested.
        operation: &'static str,
        /// The product type.
        product: String,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        let err = ValueError::OutOfRange {
            min: 1,
            max: 10,
            actual: 11,
        };
        assert_eq!(err.to_string(), "value 11 is out of range [1, 10]");
    }

    #[test]
    fn error_from_command_error() {
        let err: Error = CommandError::Empty.into();
        assert!(matches!(err, Error::Command(CommandError::Empty)));
    }

    #[test]
    fn parse_error_from_value_error() {
        let err: ParseError = ValueError::InvalidValue {
            field: "fmod",
            value: "SPIN".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "failed to parse fmod: unknown value \"SPIN\"");
    }

    #[test]
    fn invalid_transition_display() {
        let err = DeviceError::InvalidTransition {
            command: "pause",
            phase: "idle".to_string(),
        };
        assert_eq!(err.to_string(), "cannot pause while idle");
    }

    #[test]
    fn not_found_display() {
        let err = DiscoveryError::NotFound {
            serial: "NN2-EU-KJA1234A".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "device NN2-EU-KJA1234A not found on the local network"
        );
    }
}
