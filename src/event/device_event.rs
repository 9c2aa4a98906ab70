// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event types.

use std::sync::Arc;

use crate::map::AssembledMap;
use crate::state::{DeviceState, EnvironmentalState};
use crate::telemetry::{FaultReport, Goodbye, MapGlobal, TelemetryData};

/// Events emitted by a device.
///
/// Every event goes to the registered listeners in registration order and is
/// mirrored on the device's [`EventBus`](super::EventBus).
///
/// # Examples
///
/// ```
/// use purelink::event::DeviceEvent;
///
/// let event = DeviceEvent::ConnectionDegraded {
///     attempt: 2,
///     reason: "connection reset".to_string(),
/// };
/// assert!(event.is_connection());
/// assert!(!event.is_state_change());
/// ```
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The device state snapshot was replaced.
    StateChanged {
        /// Previous snapshot, if any.
        old: Option<Arc<DeviceState>>,
        /// New snapshot.
        new: Arc<DeviceState>,
    },

    /// New environmental readings arrived.
    EnvironmentChanged {
        /// Previous readings, if any.
        old: Option<Arc<EnvironmentalState>>,
        /// New readings.
        new: Arc<EnvironmentalState>,
    },

    /// A 360 Eye map was assembled (or published partially after the fallback window).
    MapAssembled(Arc<AssembledMap>),

    /// The 360 Eye reported its pose on the global map.
    Position(MapGlobal),

    /// A 360 Eye telemetry record.
    Telemetry(TelemetryData),

    /// A 360 Eye fault report.
    Fault(FaultReport),

    /// The 360 Eye announced it is going offline.
    Goodbye(Goodbye),

    /// The session reached the subscribed state.
    Connected,

    /// The link was lost and a reconnection attempt is about to start.
    ConnectionDegraded {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Why the link was lost or the last attempt failed.
        reason: String,
    },

    /// The session was re-established after a loss.
    ConnectionRestored,

    /// The session ended.
    Disconnected {
        /// Error that ended the session, `None` for an explicit disconnect.
        reason: Option<String>,
    },

    /// An inbound payload could not be decoded. State is unchanged.
    DecodeFailed {
        /// Decoder error.
        error: String,
    },

    /// An inbound message of an unknown type. State is unchanged.
    Unrecognized {
        /// The `msg` tag.
        msg_type: String,
    },
}

impl DeviceEvent {
    /// Returns `true` for connection lifecycle events.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::ConnectionDegraded { .. }
                | Self::ConnectionRestored
                | Self::Disconnected { .. }
        )
    }

    /// Returns `true` if this is a state change event.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(self, Self::StateChanged { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_events() {
        assert!(DeviceEvent::Connected.is_connection());
        assert!(DeviceEvent::ConnectionRestored.is_connection());
        assert!(DeviceEvent::Disconnected { reason: None }.is_connection());
        assert!(
            !DeviceEvent::Unrecognized {
                msg_type: "X".to_string()
            }
            .is_connection()
        );
    }

}
