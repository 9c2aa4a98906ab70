// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device state machine.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{DeviceState, EnvironmentalState, FanState, VacuumState};
use crate::event::DeviceEvent;
use crate::map::{AssembledMap, MapAssembler};
use crate::telemetry::{InboundMessage, ReportedFields, StateReport, VacuumFields};
use crate::types::ProductType;

/// Applies inbound messages to the snapshots of one device.
///
/// Messages must be applied in the order they were received; each call
/// returns the events the message produced, in order.
#[derive(Debug)]
pub struct StateMachine {
    product: ProductType,
    state: Option<Arc<DeviceState>>,
    environment: Option<Arc<EnvironmentalState>>,
    map: MapAssembler,
}

impl StateMachine {
    /// Creates a state machine for a product family.
    #[must_use]
    pub fn new(product: ProductType) -> Self {
        Self {
            product,
            state: None,
            environment: None,
            map: MapAssembler::default(),
        }
    }

    /// Sets how long an incomplete map waits before it is published partially.
    #[must_use]
    pub fn with_map_fallback(mut self, fallback: Duration) -> Self {
        self.map = MapAssembler::new(fallback);
        self
    }

    /// Current device snapshot.
    #[must_use]
    pub fn state(&self) -> Option<Arc<DeviceState>> {
        self.state.clone()
    }

    /// Current environmental snapshot.
    #[must_use]
    pub fn environment(&self) -> Option<Arc<EnvironmentalState>> {
        self.environment.clone()
    }

    /// Last published map.
    #[must_use]
    pub fn last_map(&self) -> Option<Arc<AssembledMap>> {
        self.map.last_map()
    }

    /// Applies one message and returns the resulting events.
    pub fn apply(&mut self, message: InboundMessage, now: Instant) -> Vec<DeviceEvent> {
        let mut events = Vec::new();

        match message {
            InboundMessage::CurrentState(report) => {
                self.apply_state(report, true, &mut events);
            }
            InboundMessage::StateChange(report) => {
                self.apply_state(report, false, &mut events);
            }
            InboundMessage::StateSet(_) => {
                tracing::debug!("Ignoring STATE-SET echo");
            }
            InboundMessage::EnvironmentalSensorData(reading) => {
                let new = Arc::new(EnvironmentalState::from(reading));
                let old = self.environment.replace(Arc::clone(&new));
                events.push(DeviceEvent::EnvironmentChanged { old, new });
            }
            InboundMessage::Fault(report) => events.push(DeviceEvent::Fault(report)),
            InboundMessage::Telemetry(data) => events.push(DeviceEvent::Telemetry(data)),
            InboundMessage::Goodbye(goodbye) => events.push(DeviceEvent::Goodbye(goodbye)),
            InboundMessage::MapGlobal(global) => {
                let map = self.map.close_revision(&global);
                events.push(DeviceEvent::Position(global));
                events.extend(map.map(DeviceEvent::MapAssembled));
            }
            InboundMessage::MapGrid(grid) => {
                events.extend(self.map.register_grid(&grid, now).map(DeviceEvent::MapAssembled));
            }
            InboundMessage::MapData(data) => {
                events.extend(self.map.insert_data(&data, now).map(DeviceEvent::MapAssembled));
            }
            InboundMessage::Unrecognized { msg_type, .. } => {
                tracing::warn!(msg_type = %msg_type, "Unrecognized message");
                events.push(DeviceEvent::Unrecognized { msg_type });
            }
        }

        events
    }

    /// Runs time-based work: the partial map fallback.
    pub fn tick(&mut self, now: Instant) -> Vec<DeviceEvent> {
        self.map
            .poll_timeout(now)
            .map(DeviceEvent::MapAssembled)
            .into_iter()
            .collect()
    }

    fn apply_state(&mut self, report: StateReport, full: bool, events: &mut Vec<DeviceEvent>) {
        let next = match report.fields {
            ReportedFields::Fan(fields) => {
                if self.product.is_vacuum() {
                    tracing::warn!("Ignoring fan state reported by a 360 Eye");
                    return;
                }
                let base = (!full)
                    .then(|| self.state.as_deref().and_then(DeviceState::as_fan).cloned())
                    .flatten();
                let state = match base {
                    Some(mut state) => {
                        state.apply(&fields);
                        state
                    }
                    None => FanState::from_fields(&self.product, &fields, full),
                };
                DeviceState::Fan(state)
            }
            ReportedFields::Vacuum(fields) => {
                if self.product.is_fan() {
                    tracing::warn!("Ignoring 360 Eye state reported by a fan");
                    return;
                }
                self.follow_clean_session(&fields, full);
                let base = (!full)
                    .then(|| self.state.as_deref().and_then(DeviceState::as_vacuum).cloned())
                    .flatten();
                let state = match base {
                    Some(mut state) => {
                        state.apply(&fields);
                        state
                    }
                    None => VacuumState::from_fields(&fields, full),
                };
                DeviceState::Vacuum(state)
            }
        };

        let new = Arc::new(next);
        let old = self.state.replace(Arc::clone(&new));
        events.push(DeviceEvent::StateChanged { old, new });
    }

    /// Starts a new map session on a full report or a new clean id.
    ///
    /// A full report without a clean id restarts the current session.
    fn follow_clean_session(&mut self, fields: &VacuumFields, full: bool) {
        let current = self.map.clean_id();
        let clean_id = match &fields.clean_id {
            Some(id) if full || current != Some(id.as_str()) => id.clone(),
            None if full => match current {
                Some(id) => id.to_string(),
                None => return,
            },
            _ => return,
        };
        self.map.reset(clean_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::decode;
    use crate::types::{CleaningPhase, FanMode, FanSpeed};

    const CURRENT: &[u8] = br#"{"msg":"CURRENT-STATE","time":"2017-06-20T12:00:00Z",
        "product-state":{"fmod":"FAN","fnst":"FAN","fnsp":"0002","qtar":"0003","oson":"ON",
        "rhtm":"ON","filf":"2087","nmod":"OFF","sltm":"OFF"}}"#;

    fn apply(machine: &mut StateMachine, payload: &[u8]) -> Vec<DeviceEvent> {
        machine.apply(decode(payload).unwrap(), Instant::now())
    }

    fn fan(machine: &StateMachine) -> FanState {
        machine.state().unwrap().as_fan().unwrap().clone()
    }

    #[test]
    fn current_state_is_idempotent() {
        let mut machine = StateMachine::new(ProductType::PureCoolLinkTower);
        apply(&mut machine, CURRENT);
        let first = machine.state().unwrap();
        let events = apply(&mut machine, CURRENT);
        assert_eq!(events.len(), 1);
        assert_eq!(*machine.state().unwrap(), *first);
        assert!(first.is_complete());
    }

    #[test]
    fn state_change_merges_only_its_fields() {
        let mut machine = StateMachine::new(ProductType::PureCoolLinkTower);
        apply(&mut machine, CURRENT);
        let before = fan(&machine);

        let events = apply(
            &mut machine,
            br#"{"msg":"STATE-CHANGE","product-state":{"fnsp":["0002","0007"],"nmod":["OFF","ON"]}}"#,
        );
        let after = fan(&machine);

        assert_eq!(after.speed(), FanSpeed::level(7).unwrap());
        assert!(after.night_mode());
        assert_eq!(after.fan_mode(), before.fan_mode());
        assert_eq!(after.oscillation(), before.oscillation());
        assert_eq!(after.quality_target(), before.quality_target());
        assert_eq!(after.filter_life(), before.filter_life());
        assert!(after.is_complete());

        match &events[..] {
            [DeviceEvent::StateChanged { old: Some(old), new }] => {
                assert_eq!(old.as_fan().unwrap(), &before);
                assert_eq!(new.as_fan().unwrap(), &after);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn state_change_before_current_state_is_incomplete() {
        let mut machine = StateMachine::new(ProductType::PureCoolLinkDesk);
        apply(
            &mut machine,
            br#"{"msg":"STATE-CHANGE","product-state":{"fmod":["OFF","AUTO"]}}"#,
        );
        let state = fan(&machine);
        assert_eq!(state.fan_mode(), FanMode::Auto);
        assert!(!state.is_complete());

        apply(&mut machine, CURRENT);
        assert!(fan(&machine).is_complete());
    }

    #[test]
    fn sequential_application_order() {
        let messages: [&[u8]; 3] = [
            br#"{"msg":"STATE-CHANGE","product-state":{"fnsp":["0001","0003"]}}"#,
            br#"{"msg":"STATE-CHANGE","product-state":{"fnsp":["0003","0005"]}}"#,
            br#"{"msg":"STATE-CHANGE","product-state":{"fnsp":["0005","0009"]}}"#,
        ];
        let mut machine = StateMachine::new(ProductType::PureCoolLinkTower);
        apply(&mut machine, CURRENT);
        for message in messages {
            apply(&mut machine, message);
        }
        assert_eq!(fan(&machine).speed().value(), Some(9));
    }

    #[test]
    fn unknown_message_leaves_state_alone() {
        let mut machine = StateMachine::new(ProductType::PureCoolLinkTower);
        apply(&mut machine, CURRENT);
        let before = machine.state().unwrap();

        let events = apply(&mut machine, br#"{"msg":"SOME-FUTURE-TYPE","time":"2017-06-20T12:00:00Z"}"#);
        assert!(matches!(&events[..], [DeviceEvent::Unrecognized { msg_type }] if msg_type == "SOME-FUTURE-TYPE"));
        assert!(Arc::ptr_eq(&before, &machine.state().unwrap()));
    }

    #[test]
    fn state_set_echo_is_ignored() {
        let mut machine = StateMachine::new(ProductType::PureCoolLinkTower);
        let events = apply(
            &mut machine,
            br#"{"msg":"STATE-SET","time":"2017-06-20T12:00:00Z","mode-reason":"LAPP","data":{"fnsp":"0004"}}"#,
        );
        assert!(events.is_empty());
        assert!(machine.state().is_none());
    }

    #[test]
    fn environment_snapshot() {
        let mut machine = StateMachine::new(ProductType::PureCoolLinkTower);
        let events = apply(
            &mut machine,
            br#"{"msg":"ENVIRONMENTAL-CURRENT-SENSOR-DATA","time":"2017-06-20T12:00:00Z",
                "data":{"tact":"2956","hact":"0058","pact":"0005","vact":"INIT","sltm":"OFF"}}"#,
        );
        assert!(matches!(&events[..], [DeviceEvent::EnvironmentChanged { old: None, .. }]));
        let environment = machine.environment().unwrap();
        assert_eq!(environment.humidity(), Some(58));
        assert_eq!(environment.volatile_compounds(), None);
        assert!(machine.state().is_none());
    }

    #[test]
    fn hot_cool_state() {
        let mut machine = StateMachine::new(ProductType::PureHotCoolLink);
        apply(
            &mut machine,
            br#"{"msg":"CURRENT-STATE","product-state":{"fmod":"AUTO","hmod":"HEAT",
                "hmax":"2980","hsta":"HEAT","ffoc":"OFF","tilt":"OK"}}"#,
        );
        let state = fan(&machine);
        let heating = state.heating().unwrap();
        assert_eq!(heating.heat_target.tenths_kelvin(), 2980);
        assert!(heating.heating_active);
        assert!(!heating.focus_mode);
    }

    #[test]
    fn vacuum_lifecycle_and_map_session() {
        let mut machine = StateMachine::new(ProductType::Eye360);
        apply(
            &mut machine,
            br#"{"msg":"CURRENT-STATE","state":"FULL_CLEAN_RUNNING","cleanId":"S1",
                "currentVacuumPowerMode":"halfPower","batteryChargeLevel":90,"globalPosition":[0,0]}"#,
        );
        let state = machine.state().unwrap();
        let vacuum = state.as_vacuum().unwrap();
        assert_eq!(vacuum.phase(), CleaningPhase::Cleaning);
        assert_eq!(vacuum.clean_id(), Some("S1"));
        assert_eq!(machine.map.clean_id(), Some("S1"));

        apply(
            &mut machine,
            br#"{"msg":"STATE-CHANGE","oldstate":"FULL_CLEAN_RUNNING","newstate":"FULL_CLEAN_PAUSED"}"#,
        );
        let state = machine.state().unwrap();
        assert_eq!(state.as_vacuum().unwrap().phase(), CleaningPhase::Paused);
        assert_eq!(state.as_vacuum().unwrap().battery_level(), Some(90));
    }

    #[test]
    fn map_assembled_from_wire_messages() {
        let mut machine = StateMachine::new(ProductType::Eye360);
        apply(
            &mut machine,
            br#"{"msg":"CURRENT-STATE","state":"FULL_CLEAN_RUNNING","cleanId":"S1"}"#,
        );

        for (grid, x) in [("1", 0), ("2", 1)] {
            let payload = format!(
                r#"{{"msg":"MAP-GRID","gridID":"{grid}","cleanId":"S1","resolution":5,
                    "width":10,"height":10,"anchor":[{x},0]}}"#
            );
            assert!(apply(&mut machine, payload.as_bytes()).is_empty());
            let payload = format!(
                r#"{{"msg":"MAP-DATA","gridID":"{grid}","cleanId":"S1","data":{{
                    "content-type":"application/json","content-encoding":"gzip","content":"t{grid}"}}}}"#
            );
            assert!(apply(&mut machine, payload.as_bytes()).is_empty());
        }

        let events = apply(
            &mut machine,
            br#"{"msg":"MAP-GLOBAL","gridID":"2","cleanId":"S1","x":1,"y":2,"angle":0}"#,
        );
        assert!(matches!(events[0], DeviceEvent::Position(_)));
        match &events[1] {
            DeviceEvent::MapAssembled(map) => {
                assert!(map.complete);
                assert_eq!(map.tiles.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(machine.last_map().is_some());

        // stale session
        let events = apply(
            &mut machine,
            br#"{"msg":"MAP-DATA","gridID":"1","cleanId":"S0","data":{"content-type":"a",
                "content-encoding":"b","content":"c"}}"#,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn current_state_clears_map() {
        let mut machine = StateMachine::new(ProductType::Eye360);
        let running = br#"{"msg":"CURRENT-STATE","state":"FULL_CLEAN_RUNNING","cleanId":"S1"}"#;
        apply(&mut machine, running);
        apply(
            &mut machine,
            br#"{"msg":"MAP-GRID","gridID":"1","cleanId":"S1","resolution":5,"width":10,"height":10,"anchor":[0,0]}"#,
        );
        apply(
            &mut machine,
            br#"{"msg":"MAP-DATA","gridID":"1","cleanId":"S1","data":{"content-type":"a","content-encoding":"b","content":"old"}}"#,
        );

        // Same clean id: the tiles collected so far are dropped.
        apply(&mut machine, running);
        assert_eq!(machine.map.clean_id(), Some("S1"));
        let events = apply(
            &mut machine,
            br#"{"msg":"MAP-GLOBAL","gridID":"1","cleanId":"S1","x":0,"y":0,"angle":0}"#,
        );
        assert!(matches!(&events[..], [DeviceEvent::Position(_)]));
        assert!(machine.last_map().is_none());

        // A change with the same clean id keeps the session.
        apply(
            &mut machine,
            br#"{"msg":"MAP-GRID","gridID":"2","cleanId":"S1","resolution":5,"width":10,"height":10,"anchor":[1,0]}"#,
        );
        apply(
            &mut machine,
            br#"{"msg":"STATE-CHANGE","oldstate":"FULL_CLEAN_RUNNING","newstate":"FULL_CLEAN_PAUSED","cleanId":"S1"}"#,
        );
        apply(
            &mut machine,
            br#"{"msg":"MAP-DATA","gridID":"2","cleanId":"S1","data":{"content-type":"a","content-encoding":"b","content":"new"}}"#,
        );
        let events = apply(
            &mut machine,
            br#"{"msg":"MAP-GLOBAL","gridID":"2","cleanId":"S1","x":0,"y":0,"angle":0}"#,
        );
        match &events[..] {
            [DeviceEvent::Position(_), DeviceEvent::MapAssembled(map)] => {
                assert_eq!(map.tiles.len(), 1);
                assert_eq!(map.tiles.values().next().unwrap().content, "new");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fallback_through_tick() {
        let start = Instant::now();
        let mut machine =
            StateMachine::new(ProductType::Eye360).with_map_fallback(Duration::from_secs(10));
        machine.apply(
            decode(br#"{"msg":"MAP-GRID","gridID":"1","cleanId":"S1","resolution":5,"width":1,"height":1,"anchor":[0,0]}"#).unwrap(),
            start,
        );
        machine.apply(
            decode(br#"{"msg":"MAP-DATA","gridID":"1","cleanId":"S1","data":{"content-type":"a","content-encoding":"b","content":"c"}}"#).unwrap(),
            start,
        );
        assert!(machine.tick(start + Duration::from_secs(5)).is_empty());
        let events = machine.tick(start + Duration::from_secs(10));
        assert!(matches!(&events[..], [DeviceEvent::MapAssembled(map)] if !map.complete));
    }
}
