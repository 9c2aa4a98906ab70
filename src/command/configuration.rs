// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User-facing device configuration.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{MessageType, OutboundCommand};
use crate::error::CommandError;
use crate::state::{DeviceState, FanState};
use crate::types::{
    FanMode, FanSpeed, HeatMode, HeatTarget, PowerMode, ProductType, QualityTarget, SleepTimer,
    on_off,
};

/// `mode-reason` sent with settings changes.
const MODE_REASON: &str = "LAPP";

/// Placeholder meaning "leave unchanged".
const UNCHANGED: &str = "STET";

/// 360 Eye cleaning lifecycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VacuumCommand {
    /// Start a clean.
    Start,
    /// Pause the running clean.
    Pause,
    /// Resume a paused clean.
    Resume,
    /// Abort the clean and return to the dock.
    Abort,
}

impl VacuumCommand {
    /// Returns the command name used in errors and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Abort => "abort",
        }
    }

    const fn message_type(self) -> MessageType {
        match self {
            Self::Start => MessageType::Start,
            Self::Pause => MessageType::Pause,
            Self::Resume => MessageType::Resume,
            Self::Abort => MessageType::Abort,
        }
    }
}

/// Settings to send to a device.
///
/// Set only what should change. Building checks every option against the
/// product family and fails without sending anything if one does not apply.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use purelink::command::Configuration;
/// use purelink::error::CommandError;
/// use purelink::types::{FanMode, HeatTarget, ProductType};
///
/// let config = Configuration::new()
///     .with_fan_mode(FanMode::Auto)
///     .with_night_mode(true);
/// assert!(config.build(&ProductType::PureCoolLinkDesk, "S", None, Utc::now()).is_ok());
///
/// // Heating is only available on the Hot+Cool family
/// let heat = Configuration::new().with_heat_target(HeatTarget::celsius(21).unwrap());
/// assert!(matches!(
///     heat.build(&ProductType::PureCoolLinkDesk, "S", None, Utc::now()),
///     Err(CommandError::Unsupported { option: "heat-target", .. })
/// ));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    fan_mode: Option<FanMode>,
    speed: Option<FanSpeed>,
    oscillation: Option<bool>,
    night_mode: Option<bool>,
    sleep_timer: Option<SleepTimer>,
    quality_target: Option<QualityTarget>,
    standby_monitoring: Option<bool>,
    reset_filter: bool,
    heat_mode: Option<HeatMode>,
    heat_target: Option<HeatTarget>,
    focus_mode: Option<bool>,
    power_mode: Option<PowerMode>,
    lifecycle: Option<VacuumCommand>,
}

impl Configuration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fan mode.
    #[must_use]
    pub fn with_fan_mode(mut self, mode: FanMode) -> Self {
        self.fan_mode = Some(mode);
        self
    }

    /// Sets the fan speed.
    #[must_use]
    pub fn with_speed(mut self, speed: FanSpeed) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Enables or disables oscillation.
    #[must_use]
    pub fn with_oscillation(mut self, enabled: bool) -> Self {
        self.oscillation = Some(enabled);
        self
    }

    /// Enables or disables night mode.
    #[must_use]
    pub fn with_night_mode(mut self, enabled: bool) -> Self {
        self.night_mode = Some(enabled);
        self
    }

    /// Sets the sleep timer; [`SleepTimer::OFF`] disables it.
    #[must_use]
    pub fn with_sleep_timer(mut self, timer: SleepTimer) -> Self {
        self.sleep_timer = Some(timer);
        self
    }

    /// Sets the air quality target.
    #[must_use]
    pub fn with_quality_target(mut self, target: QualityTarget) -> Self {
        self.quality_target = Some(target);
        self
    }

    /// Enables or disables air quality monitoring in standby.
    #[must_use]
    pub fn with_standby_monitoring(mut self, enabled: bool) -> Self {
        self.standby_monitoring = Some(enabled);
        self
    }

    /// Resets the filter life counter.
    #[must_use]
    pub fn with_reset_filter(mut self) -> Self {
        self.reset_filter = true;
        self
    }

    /// Sets the heating mode (Hot+Cool only).
    #[must_use]
    pub fn with_heat_mode(mut self, mode: HeatMode) -> Self {
        self.heat_mode = Some(mode);
        self
    }

    /// Sets the heating target (Hot+Cool only).
    #[must_use]
    pub fn with_heat_target(mut self, target: HeatTarget) -> Self {
        self.heat_target = Some(target);
        self
    }

    /// Enables or disables focused airflow (Hot+Cool only).
    #[must_use]
    pub fn with_focus_mode(mut self, enabled: bool) -> Self {
        self.focus_mode = Some(enabled);
        self
    }

    /// Sets the suction power (360 Eye only).
    #[must_use]
    pub fn with_power_mode(mut self, mode: PowerMode) -> Self {
        self.power_mode = Some(mode);
        self
    }

    /// Requests a cleaning lifecycle change (360 Eye only).
    ///
    /// Cannot be combined with other options.
    #[must_use]
    pub fn with_lifecycle(mut self, command: VacuumCommand) -> Self {
        self.lifecycle = Some(command);
        self
    }

    /// Returns the lifecycle command, if any.
    #[must_use]
    pub fn lifecycle(&self) -> Option<VacuumCommand> {
        self.lifecycle
    }

    /// Returns `true` if no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the fan options that are set.
    fn fan_options(&self) -> impl Iterator<Item = &'static str> {
        [
            ("fan-mode", self.fan_mode.is_some()),
            ("speed", self.speed.is_some()),
            ("oscillation", self.oscillation.is_some()),
            ("night-mode", self.night_mode.is_some()),
            ("sleep-timer", self.sleep_timer.is_some()),
            ("quality-target", self.quality_target.is_some()),
            ("standby-monitoring", self.standby_monitoring.is_some()),
            ("reset-filter", self.reset_filter),
        ]
        .into_iter()
        .chain(self.heat_options())
        .filter_map(|(name, set)| set.then_some(name))
    }

    fn heat_options(&self) -> [(&'static str, bool); 3] {
        [
            ("heat-mode", self.heat_mode.is_some()),
            ("heat-target", self.heat_target.is_some()),
            ("focus-mode", self.focus_mode.is_some()),
        ]
    }

    fn vacuum_options(&self) -> impl Iterator<Item = &'static str> {
        [
            ("power-mode", self.power_mode.is_some()),
            ("lifecycle", self.lifecycle.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
    }

    /// Builds the command for a device.
    ///
    /// For fans, options left unset are filled from `current` so the device
    /// keeps its other settings. An incomplete snapshot is not used: its
    /// unreported fields hold defaults, not device values.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Empty` if nothing is set,
    /// `CommandError::Unsupported` if an option does not apply to the
    /// product, and `CommandError::Conflicting` if a lifecycle command is
    /// combined with other options.
    pub fn build(
        &self,
        product: &ProductType,
        serial: &str,
        current: Option<&DeviceState>,
        now: DateTime<Utc>,
    ) -> Result<OutboundCommand, CommandError> {
        if self.is_empty() {
            return Err(CommandError::Empty);
        }

        if product.is_vacuum() {
            self.build_vacuum(product, serial, now)
        } else if product.is_fan() {
            let current = current
                .filter(|state| state.is_complete())
                .and_then(DeviceState::as_fan);
            self.build_fan(product, serial, current, now)
        } else {
            let option = self
                .fan_options()
                .chain(self.vacuum_options())
                .next()
                .unwrap_or("configuration");
            Err(CommandError::Unsupported {
                option,
                family: product.family(),
            })
        }
    }

    fn build_fan(
        &self,
        product: &ProductType,
        serial: &str,
        current: Option<&FanState>,
        now: DateTime<Utc>,
    ) -> Result<OutboundCommand, CommandError> {
        if let Some(option) = self.vacuum_options().next() {
            return Err(CommandError::Unsupported {
                option,
                family: product.family(),
            });
        }
        if !product.supports_heating()
            && let Some((option, _)) = self.heat_options().into_iter().find(|(_, set)| *set)
        {
            return Err(CommandError::Unsupported {
                option,
                family: product.family(),
            });
        }

        let mut data = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                data.insert(key.to_string(), value);
            }
        };

        put(
            "fmod",
            self.fan_mode
                .or(current.map(FanState::fan_mode))
                .map(|m| m.as_str().into()),
        );
        put(
            "fnsp",
            self.speed
                .or(current.map(FanState::speed))
                .map(|s| s.to_wire().into()),
        );
        put(
            "oson",
            self.oscillation
                .or(current.map(FanState::oscillation))
                .map(|v| on_off(v).into()),
        );
        put(
            "nmod",
            self.night_mode
                .or(current.map(FanState::night_mode))
                .map(|v| on_off(v).into()),
        );
        put(
            "qtar",
            self.quality_target
                .or(current.map(FanState::quality_target))
                .map(|q| q.as_str().into()),
        );
        put(
            "rhtm",
            self.standby_monitoring
                .or(current.map(FanState::standby_monitoring))
                .map(|v| on_off(v).into()),
        );
        put(
            "sltm",
            Some(
                self.sleep_timer
                    .map_or_else(|| UNCHANGED.into(), |t| t.value().into()),
            ),
        );
        put(
            "rstf",
            Some((if self.reset_filter { "RSTF" } else { UNCHANGED }).into()),
        );

        if product.supports_heating() {
            let heating = current.and_then(FanState::heating);
            put(
                "hmod",
                self.heat_mode
                    .or(heating.map(|h| h.heat_mode))
                    .map(|m| m.as_str().into()),
            );
            put(
                "hmax",
                self.heat_target
                    .or(heating.map(|h| h.heat_target))
                    .map(|t| t.to_wire().into()),
            );
            put(
                "ffoc",
                self.focus_mode
                    .or(heating.map(|h| h.focus_mode))
                    .map(|v| on_off(v).into()),
            );
        }

        Ok(OutboundCommand::new(serial, MessageType::StateSet, data, now).with_mode_reason(MODE_REASON))
    }

    fn build_vacuum(
        &self,
        product: &ProductType,
        serial: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboundCommand, CommandError> {
        if let Some(option) = self.fan_options().next() {
            return Err(CommandError::Unsupported {
                option,
                family: product.family(),
            });
        }

        match (self.lifecycle, &self.power_mode) {
            (Some(command), Some(_)) => Err(CommandError::Conflicting(command.as_str())),
            (Some(command), None) => {
                let mut fields = Map::new();
                if command == VacuumCommand::Start {
                    fields.insert("fullCleanType".to_string(), "immediate".into());
                }
                Ok(OutboundCommand::new(serial, command.message_type(), fields, now))
            }
            (None, Some(mode)) => {
                let mut data = Map::new();
                data.insert("defaultVacuumPowerMode".to_string(), mode.as_str().into());
                Ok(OutboundCommand::new(serial, MessageType::StateSet, data, now))
            }
            (None, None) => Err(CommandError::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tokio::time::Instant;

    use super::*;
    use crate::state::StateMachine;
    use crate::telemetry::{FanFields, InboundMessage, ReportedFields, decode};

    const SERIAL: &str = "AB1-EU-HEA1234A";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 6, 20, 12, 0, 0).unwrap()
    }

    fn payload(command: &OutboundCommand) -> Value {
        serde_json::from_slice(&command.encode()).unwrap()
    }

    fn requested(command: &OutboundCommand) -> FanFields {
        match decode(&command.encode()).unwrap() {
            InboundMessage::StateSet(report) => match report.fields {
                ReportedFields::Fan(fields) => fields,
                ReportedFields::Vacuum(_) => panic!("expected fan fields"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_configuration_fails() {
        let err = Configuration::new()
            .build(&ProductType::PureCoolLinkTower, SERIAL, None, now())
            .unwrap_err();
        assert_eq!(err, CommandError::Empty);
    }

    #[test]
    fn without_snapshot_only_requested_fields() {
        let command = Configuration::new()
            .with_speed(FanSpeed::level(4).unwrap())
            .build(&ProductType::PureCoolLinkTower, SERIAL, None, now())
            .unwrap();
        let data = &payload(&command)["data"];
        assert_eq!(
            *data,
            serde_json::json!({"fnsp": "0004", "sltm": "STET", "rstf": "STET"})
        );
        assert_eq!(command.target_serial(), SERIAL);
    }

    #[test]
    fn fills_from_snapshot() {
        let fields = FanFields {
            fan_mode: Some(FanMode::Auto),
            speed: Some(FanSpeed::level(2).unwrap()),
            oscillation: Some(true),
            night_mode: Some(false),
            quality_target: Some(QualityTarget::Better),
            standby_monitoring: Some(true),
            ..FanFields::default()
        };
        let state = DeviceState::Fan(FanState::from_fields(
            &ProductType::PureCoolLinkTower,
            &fields,
            true,
        ));

        let command = Configuration::new()
            .with_night_mode(true)
            .with_reset_filter()
            .build(&ProductType::PureCoolLinkTower, SERIAL, Some(&state), now())
            .unwrap();
        let data = &payload(&command)["data"];
        assert_eq!(data["fmod"], "AUTO");
        assert_eq!(data["fnsp"], "0002");
        assert_eq!(data["oson"], "ON");
        assert_eq!(data["nmod"], "ON");
        assert_eq!(data["qtar"], "0001");
        assert_eq!(data["rhtm"], "ON");
        assert_eq!(data["rstf"], "RSTF");
        assert!(data.get("hmod").is_none());
    }

    #[test]
    fn incomplete_snapshot_is_not_used() {
        let mut machine = StateMachine::new(ProductType::PureCoolLinkTower);
        let change = decode(br#"{"msg":"STATE-CHANGE","product-state":{"fnsp":["0002","0003"]}}"#)
            .unwrap();
        machine.apply(change, Instant::now());
        let state = machine.state().unwrap();
        assert!(!state.is_complete());

        let command = Configuration::new()
            .with_speed(FanSpeed::level(5).unwrap())
            .build(&ProductType::PureCoolLinkTower, SERIAL, Some(&state), now())
            .unwrap();
        assert_eq!(
            payload(&command)["data"],
            serde_json::json!({"fnsp": "0005", "sltm": "STET", "rstf": "STET"})
        );
    }

    #[test]
    fn sleep_timer_is_numeric() {
        let command = Configuration::new()
            .with_sleep_timer(SleepTimer::minutes(90).unwrap())
            .build(&ProductType::PureCoolLinkDesk, SERIAL, None, now())
            .unwrap();
        assert_eq!(payload(&command)["data"]["sltm"], 90);

        let off = Configuration::new()
            .with_sleep_timer(SleepTimer::OFF)
            .build(&ProductType::PureCoolLinkDesk, SERIAL, None, now())
            .unwrap();
        assert_eq!(payload(&off)["data"]["sltm"], 0);
    }

    #[test]
    fn options_round_trip_through_decoder() {
        let config = Configuration::new()
            .with_fan_mode(FanMode::Fan)
            .with_speed(FanSpeed::level(4).unwrap())
            .with_oscillation(false)
            .with_night_mode(true)
            .with_quality_target(QualityTarget::High)
            .with_standby_monitoring(false)
            .with_sleep_timer(SleepTimer::minutes(30).unwrap())
            .with_reset_filter()
            .with_heat_mode(HeatMode::Heat)
            .with_heat_target(HeatTarget::celsius(22).unwrap())
            .with_focus_mode(true);
        let command = config
            .build(&ProductType::PureHotCoolLink, SERIAL, None, now())
            .unwrap();

        let fields = requested(&command);
        assert_eq!(fields.fan_mode, Some(FanMode::Fan));
        assert_eq!(fields.speed.and_then(|s| s.value()), Some(4));
        assert_eq!(fields.oscillation, Some(false));
        assert_eq!(fields.night_mode, Some(true));
        assert_eq!(fields.quality_target, Some(QualityTarget::High));
        assert_eq!(fields.standby_monitoring, Some(false));
        assert_eq!(fields.sleep_timer.map(|t| t.value()), Some(30));
        assert_eq!(fields.reset_filter, Some(true));
        assert_eq!(fields.heat_mode, Some(HeatMode::Heat));
        assert_eq!(fields.heat_target.map(|t| t.tenths_kelvin()), Some(2950));
        assert_eq!(fields.focus_mode, Some(true));
    }

    #[test]
    fn heat_rejected_on_cool_family() {
        let err = Configuration::new()
            .with_focus_mode(true)
            .build(&ProductType::PureCoolLinkTower, SERIAL, None, now())
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::Unsupported {
                option: "focus-mode",
                family: "Pure Cool Link"
            }
        );
    }

    #[test]
    fn vacuum_options_rejected_on_fan() {
        let err = Configuration::new()
            .with_lifecycle(VacuumCommand::Start)
            .build(&ProductType::PureHotCoolLink, SERIAL, None, now())
            .unwrap_err();
        assert!(matches!(err, CommandError::Unsupported { option: "lifecycle", .. }));
    }

    #[test]
    fn fan_options_rejected_on_vacuum() {
        let err = Configuration::new()
            .with_oscillation(true)
            .build(&ProductType::Eye360, SERIAL, None, now())
            .unwrap_err();
        assert!(matches!(err, CommandError::Unsupported { option: "oscillation", family: "360 Eye" }));
    }

    #[test]
    fn start_payload() {
        let command = Configuration::new()
            .with_lifecycle(VacuumCommand::Start)
            .build(&ProductType::Eye360, SERIAL, None, now())
            .unwrap();
        assert_eq!(
            payload(&command),
            serde_json::json!({
                "msg": "START",
                "time": "2017-06-20T12:00:00Z",
                "fullCleanType": "immediate"
            })
        );
    }

    #[test]
    fn pause_has_no_fields() {
        let command = Configuration::new()
            .with_lifecycle(VacuumCommand::Pause)
            .build(&ProductType::Eye360, SERIAL, None, now())
            .unwrap();
        assert_eq!(
            payload(&command),
            serde_json::json!({"msg": "PAUSE", "time": "2017-06-20T12:00:00Z"})
        );
    }

    #[test]
    fn power_mode_payload() {
        let command = Configuration::new()
            .with_power_mode(PowerMode::Max)
            .build(&ProductType::Eye360, SERIAL, None, now())
            .unwrap();
        let value = payload(&command);
        assert_eq!(value["msg"], "STATE-SET");
        assert_eq!(value["data"]["defaultVacuumPowerMode"], "fullPower");
        assert!(value.get("mode-reason").is_none());
    }

    #[test]
    fn lifecycle_conflicts_with_power_mode() {
        let err = Configuration::new()
            .with_lifecycle(VacuumCommand::Abort)
            .with_power_mode(PowerMode::Quiet)
            .build(&ProductType::Eye360, SERIAL, None, now())
            .unwrap_err();
        assert_eq!(err, CommandError::Conflicting("abort"));
    }

    #[test]
    fn unknown_product_rejected() {
        let err = Configuration::new()
            .with_speed(FanSpeed::Auto)
            .build(&ProductType::Unknown("438".to_string()), SERIAL, None, now())
            .unwrap_err();
        assert!(matches!(err, CommandError::Unsupported { option: "speed", .. }));
    }
}
