// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport and session management.
//!
//! A device session runs on an authenticated publish/subscribe link. The
//! link is abstracted by three traits so the session logic does not depend
//! on the MQTT client:
//!
//! - [`Connector`]: opens the transport and authenticates, yielding a
//!   [`Publisher`] and an [`Inbound`] frame stream
//! - [`Publisher`]: sends payloads on a topic
//! - [`Inbound`]: yields received messages until the link closes
//!
//! [`MqttConnector`] implements them with `rumqttc`. [`DeviceSession`] owns
//! one link at a time and keeps it alive across drops.

#[cfg(feature = "mqtt")]
mod mqtt;
mod session;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttConnector, MqttInbound, MqttPublisher};
pub use session::{DeviceSession, EventSink, SessionEvent};

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::credential::ResolvedCredential;
use crate::discovery::NetworkLocation;
use crate::error::ProtocolError;

/// Delivery guarantee requested for an outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Fire and forget (MQTT QoS 0).
    AtMostOnce,
    /// Acknowledged by the device (MQTT QoS 1).
    AtLeastOnce,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No session.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Transport open, presenting credentials.
    Authenticating,
    /// Authenticated and subscribed to the status topic.
    Subscribed,
    /// Link lost, trying to re-establish it.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
    },
}

impl SessionState {
    /// Returns true if commands can be published.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Subscribed => f.write_str("subscribed"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// A frame received from the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A message published on a subscribed topic.
    Message {
        /// Topic the message arrived on.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
    /// The link closed. No frame follows.
    Closed(String),
}

/// Parameters for authenticating a link.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    /// Where the device is.
    pub location: &'a NetworkLocation,
    /// Serial (identity) and local password.
    pub credential: &'a ResolvedCredential,
    /// Topic to subscribe to once authenticated.
    pub status_topic: &'a str,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Upper bound for authenticating and subscribing.
    pub timeout: Duration,
}

/// Opens authenticated links to a device.
pub trait Connector: Send + Sync + 'static {
    /// Outbound half of a link.
    type Publisher: Publisher;
    /// Inbound half of a link.
    type Inbound: Inbound;

    /// Checks that the transport can be opened.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::ConnectionFailed` or `Timeout` if the device
    /// cannot be reached.
    fn open(
        &self,
        location: &NetworkLocation,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Authenticates and subscribes to the status topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::AuthenticationFailed` if the device refused
    /// the credential, other variants for transport failures.
    fn authenticate(
        &self,
        request: ConnectRequest<'_>,
    ) -> impl Future<Output = Result<(Self::Publisher, Self::Inbound), ProtocolError>> + Send;
}

/// Outbound half of a link. Shared between the session task and callers.
pub trait Publisher: Send + Sync + 'static {
    /// Queues a payload for delivery.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the link can no longer send.
    fn publish(&self, topic: &str, payload: Vec<u8>, delivery: Delivery) -> Result<(), ProtocolError>;

    /// Closes the link. Further publishes fail.
    fn close(&self);
}

/// Inbound half of a link, owned by the session task.
pub trait Inbound: Send + 'static {
    /// Waits for the next frame. Returns [`Frame::Closed`] once the link is gone.
    fn recv(&mut self) -> impl Future<Output = Frame> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_display() {
        assert_eq!(SessionState::Subscribed.to_string(), "subscribed");
        assert_eq!(
            SessionState::Reconnecting { attempt: 3 }.to_string(),
            "reconnecting (attempt 3)"
        );
        assert!(SessionState::Subscribed.is_subscribed());
        assert!(!SessionState::Authenticating.is_subscribed());
    }
}
