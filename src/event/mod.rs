// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device events.
//!
//! The session task turns every inbound message and connection change into
//! [`DeviceEvent`]s. They are delivered to listeners (see
//! [`subscription`](crate::subscription)) and mirrored on an [`EventBus`],
//! a tokio broadcast channel for consumers that prefer to `await` them.
//!
//! # Examples
//!
//! ```
//! use purelink::event::{DeviceEvent, EventBus};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(DeviceEvent::Disconnected { reason: None });
//! ```

mod device_event;
mod event_bus;

pub use device_event::DeviceEvent;
pub use event_bus::EventBus;
