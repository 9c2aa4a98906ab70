// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Listener registration for device events.
//!
//! - [`SubscriptionId`] - A token identifying a registration, used to unsubscribe
//! - [`CallbackRegistry`] - Registry that stores listeners and dispatches events
//! - [`Subscribable`] - Trait with typed helpers over the generic listener
//!
//! Listeners run on the device's session task, in registration order, one
//! event at a time. Keep them short; hand heavy work to another task, or use
//! [`Device::subscribe_events`](crate::Device::subscribe_events) instead.
//!
//! # Usage
//!
//! ```no_run
//! use purelink::{AccountDeviceRecord, MqttDevice};
//! use purelink::subscription::Subscribable;
//!
//! # async fn example(record: AccountDeviceRecord) -> purelink::Result<()> {
//! let device = MqttDevice::from_record(&record)?;
//!
//! let sub_id = device.on_state_changed(|_old, new| {
//!     println!("now {new:?}");
//! });
//!
//! device.connect(None).await?;
//!
//! // Later, unsubscribe
//! device.unsubscribe(sub_id);
//! # Ok(())
//! # }
//! ```

mod callback;
mod subscribable;

pub use callback::{CallbackRegistry, SubscriptionId};
pub use subscribable::Subscribable;
