// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Robot vacuum types for the 360 Eye.
//!
//! The robot reports a fine-grained [`RobotMode`]; the lifecycle checks only
//! care about the coarser [`CleaningPhase`] derived from it.

use std::fmt;

/// Suction power mode (`currentVacuumPowerMode` / `defaultVacuumPowerMode`).
///
/// Unknown values reported by newer firmware are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PowerMode {
    /// Quiet mode (`halfPower`).
    #[default]
    Quiet,
    /// Maximum power (`fullPower`).
    Max,
    /// A value this library does not know.
    Unknown(String),
}

impl PowerMode {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Quiet => "halfPower",
            Self::Max => "fullPower",
            Self::Unknown(raw) => raw,
        }
    }

    /// Maps a wire value, keeping unknown values.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "halfPower" => Self::Quiet,
            "fullPower" => Self::Max,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw robot state (`state` / `newstate`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum RobotMode {
    #[default]
    InactiveCharged,
    InactiveCharging,
    InactiveDischarging,
    FullCleanInitiated,
    FullCleanRunning,
    FullCleanPaused,
    FullCleanAborted,
    FullCleanFinished,
    FullCleanNeedsCharge,
    FullCleanCharging,
    FaultCritical,
    FaultUserRecoverable,
    FaultReplaceOnDock,
    FaultOnDock,
    FaultReturnToDock,
    /// A state string this library does not know.
    Unknown(String),
}

impl RobotMode {
    /// Maps a wire value, keeping unknown values.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "INACTIVE_CHARGED" => Self::InactiveCharged,
            "INACTIVE_CHARGING" => Self::InactiveCharging,
            "INACTIVE_DISCHARGING" => Self::InactiveDischarging,
            "FULL_CLEAN_INITIATED" => Self::FullCleanInitiated,
            "FULL_CLEAN_RUNNING" => Self::FullCleanRunning,
            "FULL_CLEAN_PAUSED" => Self::FullCleanPaused,
            "FULL_CLEAN_ABORTED" => Self::FullCleanAborted,
            "FULL_CLEAN_FINISHED" => Self::FullCleanFinished,
            "FULL_CLEAN_NEEDS_CHARGE" => Self::FullCleanNeedsCharge,
            "FULL_CLEAN_CHARGING" => Self::FullCleanCharging,
            "FAULT_CRITICAL" => Self::FaultCritical,
            "FAULT_USER_RECOVERABLE" => Self::FaultUserRecoverable,
            "FAULT_REPLACE_ON_DOCK" => Self::FaultReplaceOnDock,
            "FAULT_ON_DOCK" => Self::FaultOnDock,
            "FAULT_RETURN_TO_DOCK" => Self::FaultReturnToDock,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InactiveCharged => "INACTIVE_CHARGED",
            Self::InactiveCharging => "INACTIVE_CHARGING",
            Self::InactiveDischarging => "INACTIVE_DISCHARGING",
            Self::FullCleanInitiated => "FULL_CLEAN_INITIATED",
            Self::FullCleanRunning => "FULL_CLEAN_RUNNING",
            Self::FullCleanPaused => "FULL_CLEAN_PAUSED",
            Self::FullCleanAborted => "FULL_CLEAN_ABORTED",
            Self::FullCleanFinished => "FULL_CLEAN_FINISHED",
            Self::FullCleanNeedsCharge => "FULL_CLEAN_NEEDS_CHARGE",
            Self::FullCleanCharging => "FULL_CLEAN_CHARGING",
            Self::FaultCritical => "FAULT_CRITICAL",
            Self::FaultUserRecoverable => "FAULT_USER_RECOVERABLE",
            Self::FaultReplaceOnDock => "FAULT_REPLACE_ON_DOCK",
            Self::FaultOnDock => "FAULT_ON_DOCK",
            Self::FaultReturnToDock => "FAULT_RETURN_TO_DOCK",
            Self::Unknown(raw) => raw,
        }
    }

    /// Returns the lifecycle phase this mode belongs to.
    #[must_use]
    pub fn phase(&self) -> CleaningPhase {
        match self {
            Self::InactiveCharged | Self::InactiveCharging | Self::InactiveDischarging => {
                CleaningPhase::Idle
            }
            Self::FullCleanInitiated | Self::FullCleanRunning => CleaningPhase::Cleaning,
            Self::FullCleanPaused => CleaningPhase::Paused,
            Self::FullCleanAborted => CleaningPhase::Aborted,
            Self::FullCleanFinished | Self::FullCleanNeedsCharge | Self::FullCleanCharging => {
                CleaningPhase::Returning
            }
            Self::FaultCritical
            | Self::FaultUserRecoverable
            | Self::FaultReplaceOnDock
            | Self::FaultOnDock
            | Self::FaultReturnToDock => CleaningPhase::Fault,
            Self::Unknown(_) => CleaningPhase::Unknown,
        }
    }
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse cleaning lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CleaningPhase {
    /// Docked or standing by.
    #[default]
    Idle,
    /// A clean is running.
    Cleaning,
    /// The clean is paused.
    Paused,
    /// Finished or recharging, heading back to the dock.
    Returning,
    /// The clean was aborted.
    Aborted,
    /// The robot reports a fault.
    Fault,
    /// The robot reported a mode this library does not know.
    Unknown,
}

impl fmt::Display for CleaningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Cleaning => "cleaning",
            Self::Paused => "paused",
            Self::Returning => "returning",
            Self::Aborted => "aborted",
            Self::Fault => "fault",
            Self::Unknown => "unknown",
        })
    }
}

/// Robot position on the global map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_values_are_preserved() {
        let mode = RobotMode::from_wire("MAPPING_RUNNING");
        assert_eq!(mode.as_str(), "MAPPING_RUNNING");
        assert_eq!(mode.phase(), CleaningPhase::Unknown);

        let power = PowerMode::from_wire("turbo");
        assert_eq!(power, PowerMode::Unknown("turbo".to_string()));
    }

    #[test]
    fn phases() {
        assert_eq!(RobotMode::from_wire("FULL_CLEAN_RUNNING").phase(), CleaningPhase::Cleaning);
        assert_eq!(RobotMode::from_wire("FULL_CLEAN_PAUSED").phase(), CleaningPhase::Paused);
        assert_eq!(RobotMode::from_wire("INACTIVE_CHARGED").phase(), CleaningPhase::Idle);
        assert_eq!(RobotMode::from_wire("FULL_CLEAN_FINISHED").phase(), CleaningPhase::Returning);
        assert_eq!(RobotMode::from_wire("FAULT_ON_DOCK").phase(), CleaningPhase::Fault);
    }

    #[test]
    fn power_mode_wire() {
        assert_eq!(PowerMode::Quiet.as_str(), "halfPower");
        assert_eq!(PowerMode::from_wire("fullPower"), PowerMode::Max);
    }
}
