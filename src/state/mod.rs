// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state tracking.
//!
//! [`StateMachine`] consumes decoded messages in arrival order and keeps the
//! last known [`DeviceState`] and [`EnvironmentalState`] of one device.
//! `CURRENT-STATE` replaces the snapshot, `STATE-CHANGE` merges into it.
//! Every merge yields a fresh immutable snapshot, so readers never observe a
//! partial update.
//!
//! # Examples
//!
//! ```
//! use purelink::state::StateMachine;
//! use purelink::telemetry::decode;
//! use purelink::types::{FanMode, ProductType};
//! use tokio::time::Instant;
//!
//! let mut machine = StateMachine::new(ProductType::PureCoolLinkTower);
//!
//! let message = decode(br#"{"msg":"CURRENT-STATE","time":"2017-06-20T12:00:00Z",
//!     "product-state":{"fmod":"FAN","fnsp":"0002"}}"#).unwrap();
//! let events = machine.apply(message, Instant::now());
//! assert_eq!(events.len(), 1);
//!
//! let state = machine.state().unwrap();
//! assert_eq!(state.as_fan().unwrap().fan_mode(), FanMode::Fan);
//! ```

mod device_state;
mod environmental;
mod machine;

pub use device_state::{DeviceState, FanState, HeatingState, VacuumState};
pub(crate) use device_state::check_transition;
pub use environmental::EnvironmentalState;
pub use machine::StateMachine;
