// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscribable trait for types that deliver device events.

use crate::event::DeviceEvent;
use crate::map::AssembledMap;
use crate::state::{DeviceState, EnvironmentalState};
use crate::subscription::{CallbackRegistry, SubscriptionId};

/// Trait for types that deliver device events to listeners.
///
/// Only [`add_listener`](Self::add_listener) and
/// [`remove_listener`](Self::remove_listener) need implementing; the typed
/// helpers filter the event stream down to one kind of event.
///
/// # Examples
///
/// ```
/// use purelink::subscription::{CallbackRegistry, Subscribable};
///
/// let registry = CallbackRegistry::new();
///
/// let sub_id = registry.on_state_changed(|old, new| {
///     println!("state {old:?} -> {new:?}");
/// });
///
/// registry.on_connection_changed(|event| println!("link: {event:?}"));
///
/// registry.unsubscribe(sub_id);
/// ```
pub trait Subscribable {
    /// Registers a listener for every event.
    fn add_listener<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static;

    /// Unregisters a listener.
    ///
    /// Returns `true` if the subscription was found and removed.
    fn remove_listener(&self, id: SubscriptionId) -> bool;

    /// Subscribes to device state snapshots.
    ///
    /// The callback receives the previous snapshot, if any, and the new one.
    fn on_state_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Option<&DeviceState>, &DeviceState) + Send + Sync + 'static,
    {
        self.add_listener(move |event| {
            if let DeviceEvent::StateChanged { old, new } = event {
                callback(old.as_deref(), new);
            }
        })
    }

    /// Subscribes to environmental readings.
    fn on_environment_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&EnvironmentalState) + Send + Sync + 'static,
    {
        self.add_listener(move |event| {
            if let DeviceEvent::EnvironmentChanged { new, .. } = event {
                callback(new);
            }
        })
    }

    /// Subscribes to assembled 360 Eye maps.
    fn on_map_assembled<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AssembledMap) + Send + Sync + 'static,
    {
        self.add_listener(move |event| {
            if let DeviceEvent::MapAssembled(map) = event {
                callback(map);
            }
        })
    }

    /// Subscribes to connection lifecycle events.
    fn on_connection_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.add_listener(move |event| {
            if event.is_connection() {
                callback(event);
            }
        })
    }

    /// Unsubscribes a callback by its subscription ID.
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.remove_listener(id)
    }
}

impl Subscribable for CallbackRegistry {
    fn add_listener<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        CallbackRegistry::add_listener(self, callback)
    }

    fn remove_listener(&self, id: SubscriptionId) -> bool {
        CallbackRegistry::remove_listener(self, id)
    }
}
