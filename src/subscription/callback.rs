// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Listener registry.
//!
//! - [`SubscriptionId`] - Token returned on registration, used to unsubscribe
//! - [`CallbackRegistry`] - Stores listeners and dispatches events to them

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::event::DeviceEvent;

/// Unique identifier for a subscription.
///
/// IDs increase monotonically within a device's lifetime, so ordering by ID
/// is registration order.
///
/// # Examples
///
/// ```
/// use purelink::subscription::CallbackRegistry;
///
/// let registry = CallbackRegistry::new();
/// let id = registry.add_listener(|event| println!("{event:?}"));
///
/// assert!(registry.remove_listener(id));
/// assert!(!registry.remove_listener(id));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type Listener = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Registry of device event listeners.
///
/// Registration and removal may happen from any thread while the session
/// task dispatches. Dispatch takes a snapshot of the listeners under the
/// lock and calls them outside it, so a listener may itself register or
/// remove listeners. A listener that panics is logged and skipped; later
/// listeners still receive the event.
pub struct CallbackRegistry {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<SubscriptionId, Listener>>,
}

impl CallbackRegistry {
    /// Creates a new empty callback registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a listener for every event.
    pub fn add_listener<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().insert(id, Arc::new(callback));
        id
    }

    /// Unregisters a listener.
    ///
    /// Returns `true` if a listener was found and removed.
    pub fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Removes all listeners.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Delivers an event to every listener in registration order.
    pub fn dispatch(&self, event: &DeviceEvent) {
        let listeners: Vec<(SubscriptionId, Listener)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(subscription = %id, "Listener panicked, continuing dispatch");
            }
        }
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns `true` if there are no registered listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn subscription_id_display() {
        assert_eq!(SubscriptionId(42).to_string(), "Sub(42)");
    }

    #[test]
    fn registry_new_is_empty() {
        let registry = CallbackRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn dispatch_and_remove() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let id = registry.add_listener(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&DeviceEvent::Connected);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(registry.remove_listener(id));
        registry.dispatch(&DeviceEvent::Connected);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_in_registration_order() {
        let registry = CallbackRegistry::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for n in 0..5 {
            let order = order.clone();
            registry.add_listener(move |_| order.lock().push(n));
        }

        registry.dispatch(&DeviceEvent::ConnectionRestored);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        registry.add_listener(|_| panic!("listener failure"));
        registry.add_listener(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&DeviceEvent::Connected);
        registry.dispatch(&DeviceEvent::Connected);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let registry = Arc::new(CallbackRegistry::new());
        let slot = Arc::new(parking_lot::Mutex::new(None));

        let registry_clone = Arc::clone(&registry);
        let slot_clone = Arc::clone(&slot);
        let id = registry.add_listener(move |_| {
            if let Some(id) = *slot_clone.lock() {
                registry_clone.remove_listener(id);
            }
        });
        *slot.lock() = Some(id);

        registry.dispatch(&DeviceEvent::Connected);
        assert!(registry.is_empty());
    }

    #[test]
    fn unique_ids() {
        let registry = CallbackRegistry::new();
        let id1 = registry.add_listener(|_| {});
        let id2 = registry.add_listener(|_| {});
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[test]
    fn registry_debug() {
        let registry = CallbackRegistry::new();
        registry.add_listener(|_| {});
        let debug = format!("{registry:?}");
        assert!(debug.contains("CallbackRegistry"));
        assert!(debug.contains("listeners"));
    }
}
