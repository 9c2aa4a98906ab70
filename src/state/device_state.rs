// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state snapshots.

use crate::command::VacuumCommand;
use crate::error::DeviceError;
use crate::telemetry::{FanFields, VacuumFields};
use crate::types::{
    CleaningPhase, FanMode, FanSpeed, HeatMode, HeatTarget, Position, PowerMode, ProductType,
    QualityTarget, RobotMode, SleepTimer,
};

/// Last known state of a device.
///
/// Snapshots are immutable once published; the state machine builds a new
/// one for every merge and readers share it through an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceState {
    /// Pure Cool Link or Pure Hot+Cool Link.
    Fan(FanState),
    /// 360 Eye.
    Vacuum(VacuumState),
}

impl DeviceState {
    /// Returns the fan state, if this is a fan.
    #[must_use]
    pub fn as_fan(&self) -> Option<&FanState> {
        match self {
            Self::Fan(state) => Some(state),
            Self::Vacuum(_) => None,
        }
    }

    /// Returns the vacuum state, if this is a 360 Eye.
    #[must_use]
    pub fn as_vacuum(&self) -> Option<&VacuumState> {
        match self {
            Self::Vacuum(state) => Some(state),
            Self::Fan(_) => None,
        }
    }

    /// Returns `false` until a full `CURRENT-STATE` has been seen.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            Self::Fan(state) => state.complete,
            Self::Vacuum(state) => state.complete,
        }
    }
}

/// Heating fields of the Pure Hot+Cool Link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeatingState {
    /// Heating mode.
    pub heat_mode: HeatMode,
    /// Target temperature.
    pub heat_target: HeatTarget,
    /// Whether the heater is currently on.
    pub heating_active: bool,
    /// Focused airflow.
    pub focus_mode: bool,
    /// Whether the device reports being tilted.
    pub tilted: bool,
}

/// State of a fan.
///
/// Fields not yet reported hold their defaults; [`is_complete`](Self::is_complete)
/// tells whether they are authoritative.
///
/// # Examples
///
/// ```
/// use purelink::state::FanState;
/// use purelink::telemetry::FanFields;
/// use purelink::types::{FanMode, ProductType};
///
/// let fields = FanFields {
///     fan_mode: Some(FanMode::Auto),
///     ..FanFields::default()
/// };
/// let state = FanState::from_fields(&ProductType::PureCoolLinkTower, &fields, false);
/// assert_eq!(state.fan_mode(), FanMode::Auto);
/// assert!(!state.is_complete());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FanState {
    fan_mode: FanMode,
    fan_running: bool,
    speed: FanSpeed,
    oscillation: bool,
    night_mode: bool,
    filter_life: Option<u16>,
    quality_target: QualityTarget,
    standby_monitoring: bool,
    sleep_timer: SleepTimer,
    heating: Option<HeatingState>,
    complete: bool,
}

impl FanState {
    /// Builds a snapshot from defaults plus the given fields.
    #[must_use]
    pub fn from_fields(product: &ProductType, fields: &FanFields, complete: bool) -> Self {
        let mut state = Self {
            heating: product.supports_heating().then(HeatingState::default),
            complete,
            ..Self::default()
        };
        state.apply(fields);
        state
    }

    /// Merges reported fields, returning `true` if any value changed.
    pub fn apply(&mut self, fields: &FanFields) -> bool {
        let mut changed = false;

        macro_rules! update_if_some {
            ($target:expr, $value:expr) => {
                if let Some(v) = $value
                    && $target != v
                {
                    $target = v;
                    changed = true;
                }
            };
        }

        update_if_some!(self.fan_mode, fields.fan_mode);
        update_if_some!(self.fan_running, fields.fan_running);
        update_if_some!(self.speed, fields.speed);
        update_if_some!(self.oscillation, fields.oscillation);
        update_if_some!(self.night_mode, fields.night_mode);
        update_if_some!(self.quality_target, fields.quality_target);
        update_if_some!(self.standby_monitoring, fields.standby_monitoring);
        update_if_some!(self.sleep_timer, fields.sleep_timer);

        if let Some(hours) = fields.filter_life
            && self.filter_life != Some(hours)
        {
            self.filter_life = Some(hours);
            changed = true;
        }

        let reports_heating = fields.heat_mode.is_some()
            || fields.heat_target.is_some()
            || fields.heating_active.is_some()
            || fields.focus_mode.is_some()
            || fields.tilted.is_some();
        if reports_heating {
            let heating = self.heating.get_or_insert_with(HeatingState::default);
            update_if_some!(heating.heat_mode, fields.heat_mode);
            update_if_some!(heating.heat_target, fields.heat_target);
            update_if_some!(heating.heating_active, fields.heating_active);
            update_if_some!(heating.focus_mode, fields.focus_mode);
            update_if_some!(heating.tilted, fields.tilted);
        }

        changed
    }

    /// Operating mode.
    #[must_use]
    pub fn fan_mode(&self) -> FanMode {
        self.fan_mode
    }

    /// Whether the motor is running.
    #[must_use]
    pub fn fan_running(&self) -> bool {
        self.fan_running
    }

    /// Fan speed.
    #[must_use]
    pub fn speed(&self) -> FanSpeed {
        self.speed
    }

    /// Oscillation.
    #[must_use]
    pub fn oscillation(&self) -> bool {
        self.oscillation
    }

    /// Night mode.
    #[must_use]
    pub fn night_mode(&self) -> bool {
        self.night_mode
    }

    /// Remaining filter life in hours, once reported.
    #[must_use]
    pub fn filter_life(&self) -> Option<u16> {
        self.filter_life
    }

    /// Air quality target.
    #[must_use]
    pub fn quality_target(&self) -> QualityTarget {
        self.quality_target
    }

    /// Air quality monitoring in standby.
    #[must_use]
    pub fn standby_monitoring(&self) -> bool {
        self.standby_monitoring
    }

    /// Sleep timer.
    #[must_use]
    pub fn sleep_timer(&self) -> SleepTimer {
        self.sleep_timer
    }

    /// Heating fields, present for the Hot+Cool family.
    #[must_use]
    pub fn heating(&self) -> Option<&HeatingState> {
        self.heating.as_ref()
    }

    /// Returns `false` until a full `CURRENT-STATE` has been seen.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// State of a 360 Eye.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VacuumState {
    mode: RobotMode,
    full_clean_type: Option<String>,
    position: Option<Position>,
    power_mode: PowerMode,
    clean_id: Option<String>,
    battery_level: Option<u8>,
    complete: bool,
}

impl VacuumState {
    /// Builds a snapshot from defaults plus the given fields.
    #[must_use]
    pub fn from_fields(fields: &VacuumFields, complete: bool) -> Self {
        let mut state = Self {
            complete,
            ..Self::default()
        };
        state.apply(fields);
        state
    }

    /// Merges reported fields, returning `true` if any value changed.
    pub fn apply(&mut self, fields: &VacuumFields) -> bool {
        let mut changed = false;

        macro_rules! update_if_some {
            ($field:ident) => {
                if let Some(v) = &fields.$field
                    && self.$field != *v
                {
                    self.$field = v.clone();
                    changed = true;
                }
            };
            ($field:ident, optional) => {
                if let Some(v) = &fields.$field
                    && self.$field.as_ref() != Some(v)
                {
                    self.$field = Some(v.clone());
                    changed = true;
                }
            };
        }

        update_if_some!(mode);
        update_if_some!(power_mode);
        update_if_some!(full_clean_type, optional);
        update_if_some!(position, optional);
        update_if_some!(clean_id, optional);
        update_if_some!(battery_level, optional);

        changed
    }

    /// Raw robot mode.
    #[must_use]
    pub fn mode(&self) -> &RobotMode {
        &self.mode
    }

    /// Lifecycle phase derived from the mode.
    #[must_use]
    pub fn phase(&self) -> CleaningPhase {
        self.mode.phase()
    }

    /// Clean type of the current run.
    #[must_use]
    pub fn full_clean_type(&self) -> Option<&str> {
        self.full_clean_type.as_deref()
    }

    /// Last reported position.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Suction power mode.
    #[must_use]
    pub fn power_mode(&self) -> &PowerMode {
        &self.power_mode
    }

    /// Identifier of the current cleaning session.
    #[must_use]
    pub fn clean_id(&self) -> Option<&str> {
        self.clean_id.as_deref()
    }

    /// Battery level in percent.
    #[must_use]
    pub fn battery_level(&self) -> Option<u8> {
        self.battery_level
    }

    /// Returns `false` until a full `CURRENT-STATE` has been seen.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Checks that `command` is valid in the current phase.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidTransition` if the robot cannot accept
    /// the command in its current phase.
    pub fn check_transition(&self, command: VacuumCommand) -> Result<(), DeviceError> {
        check_transition(Some(self.phase()), command)
    }
}

/// Checks a lifecycle command against a phase; `None` means nothing is known
/// yet, in which case only `start` is accepted.
pub(crate) fn check_transition(
    phase: Option<CleaningPhase>,
    command: VacuumCommand,
) -> Result<(), DeviceError> {
    use CleaningPhase::{Aborted, Cleaning, Idle, Paused, Returning, Unknown};

    let allowed = match command {
        VacuumCommand::Start => matches!(phase, None | Some(Idle | Aborted | Returning | Unknown)),
        VacuumCommand::Pause => matches!(phase, Some(Cleaning)),
        VacuumCommand::Resume => matches!(phase, Some(Paused)),
        VacuumCommand::Abort => matches!(phase, Some(Cleaning | Paused)),
    };

    if allowed {
        Ok(())
    } else {
        Err(DeviceError::InvalidTransition {
            command: command.as_str(),
            phase: phase.map_or_else(|| "unknown".to_string(), |p| p.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> VacuumState {
        VacuumState::from_fields(
            &VacuumFields {
                mode: Some(RobotMode::FullCleanRunning),
                ..VacuumFields::default()
            },
            true,
        )
    }

    #[test]
    fn fan_defaults_for_unseen_fields() {
        let fields = FanFields {
            speed: Some(FanSpeed::level(7).unwrap()),
            ..FanFields::default()
        };
        let state = FanState::from_fields(&ProductType::PureCoolLinkDesk, &fields, false);
        assert_eq!(state.speed().value(), Some(7));
        assert_eq!(state.fan_mode(), FanMode::Off);
        assert!(state.heating().is_none());
        assert!(!state.is_complete());
    }

    #[test]
    fn hot_cool_has_heating() {
        let state = FanState::from_fields(&ProductType::PureHotCoolLink, &FanFields::default(), true);
        let heating = state.heating().unwrap();
        assert_eq!(heating.heat_mode, HeatMode::Off);
        assert_eq!(heating.heat_target, HeatTarget::default());
    }

    #[test]
    fn merge_touches_only_reported_fields() {
        let full = FanFields {
            fan_mode: Some(FanMode::Fan),
            speed: Some(FanSpeed::level(2).unwrap()),
            oscillation: Some(true),
            night_mode: Some(false),
            filter_life: Some(2000),
            ..FanFields::default()
        };
        let before = FanState::from_fields(&ProductType::PureCoolLinkTower, &full, true);

        let mut after = before.clone();
        let changed = after.apply(&FanFields {
            speed: Some(FanSpeed::Auto),
            night_mode: Some(true),
            ..FanFields::default()
        });

        assert!(changed);
        assert_eq!(after.speed(), FanSpeed::Auto);
        assert!(after.night_mode());
        assert_eq!(after.fan_mode(), before.fan_mode());
        assert_eq!(after.oscillation(), before.oscillation());
        assert_eq!(after.filter_life(), before.filter_life());
    }

    #[test]
    fn apply_same_value_reports_no_change() {
        let fields = FanFields {
            oscillation: Some(true),
            ..FanFields::default()
        };
        let mut state = FanState::from_fields(&ProductType::PureCoolLinkTower, &fields, true);
        assert!(!state.apply(&fields));
    }

    #[test]
    fn vacuum_merge() {
        let mut state = running();
        let changed = state.apply(&VacuumFields {
            battery_level: Some(55),
            position: Some(Position { x: 3, y: 4 }),
            ..VacuumFields::default()
        });
        assert!(changed);
        assert_eq!(state.phase(), CleaningPhase::Cleaning);
        assert_eq!(state.battery_level(), Some(55));
        assert_eq!(state.position(), Some(Position { x: 3, y: 4 }));
    }

    #[test]
    fn lifecycle_rules() {
        let state = running();
        assert!(state.check_transition(VacuumCommand::Pause).is_ok());
        assert!(state.check_transition(VacuumCommand::Abort).is_ok());
        assert!(state.check_transition(VacuumCommand::Resume).is_err());
        assert!(state.check_transition(VacuumCommand::Start).is_err());

        let idle = VacuumState::default();
        let err = idle.check_transition(VacuumCommand::Pause).unwrap_err();
        assert_eq!(err.to_string(), "cannot pause while idle");
        assert!(idle.check_transition(VacuumCommand::Start).is_ok());
    }

    #[test]
    fn lifecycle_without_snapshot() {
        assert!(check_transition(None, VacuumCommand::Start).is_ok());
        assert!(check_transition(None, VacuumCommand::Abort).is_err());
    }
}
