// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level device handle.
//!
//! A [`Device`] ties together the session, the state machine and the
//! listeners of one Dyson device. The background session task is the only
//! writer of the state snapshots; every other method can be called from any
//! task at any time.
//!
//! ```no_run
//! use purelink::account::parse_manifest;
//! use purelink::command::Configuration;
//! use purelink::subscription::Subscribable;
//! use purelink::types::{FanMode, FanSpeed};
//! use purelink::MqttDevice;
//!
//! # async fn example(manifest: &str) -> purelink::Result<()> {
//! let records = parse_manifest(manifest)?;
//! let device = MqttDevice::from_record(&records[0])?;
//!
//! device.on_state_changed(|_, new| println!("state: {new:?}"));
//! device.connect(Some("192.168.1.42")).await?;
//!
//! device.send_configuration(
//!     &Configuration::new()
//!         .with_fan_mode(FanMode::Fan)
//!         .with_speed(FanSpeed::level(4)?),
//! )?;
//!
//! device.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::DeviceBuilder;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::command::{Configuration, OutboundCommand, VacuumCommand};
use crate::config::DeviceConfig;
use crate::credential::ResolvedCredential;
use crate::discovery::NetworkLocation;
use crate::error::{DeviceError, Result};
use crate::event::{DeviceEvent, EventBus};
use crate::map::AssembledMap;
use crate::protocol::{Connector, DeviceSession, EventSink, SessionEvent, SessionState};
use crate::state::{self, DeviceState, EnvironmentalState, StateMachine, VacuumState};
use crate::subscription::{CallbackRegistry, Subscribable, SubscriptionId};
use crate::telemetry;
use crate::types::{PowerMode, ProductType};

#[cfg(feature = "mqtt")]
use crate::account::AccountDeviceRecord;
#[cfg(feature = "mqtt")]
use crate::protocol::MqttConnector;

/// A device reached over its local MQTT interface.
#[cfg(feature = "mqtt")]
pub type MqttDevice = Device<MqttConnector>;

/// A Dyson device.
///
/// The type parameter selects the transport; [`MqttDevice`] is the one to
/// use outside tests.
pub struct Device<C: Connector> {
    session: DeviceSession<C>,
    address: Option<String>,
    shared: Arc<Shared>,
}

/// State shared with the session task.
struct Shared {
    serial: String,
    machine: Mutex<StateMachine>,
    state: watch::Sender<Option<Arc<DeviceState>>>,
    environment: watch::Sender<Option<Arc<EnvironmentalState>>>,
    map: watch::Sender<Option<Arc<AssembledMap>>>,
    callbacks: CallbackRegistry,
    events: EventBus,
}

impl<C: Connector> Device<C> {
    pub(crate) fn new(
        credential: ResolvedCredential,
        product: ProductType,
        connector: C,
        config: DeviceConfig,
        address: Option<String>,
    ) -> Self {
        let machine = StateMachine::new(product.clone()).with_map_fallback(config.map_fallback);
        let shared = Arc::new(Shared {
            serial: credential.serial().to_string(),
            machine: Mutex::new(machine),
            state: watch::channel(None).0,
            environment: watch::channel(None).0,
            map: watch::channel(None).0,
            callbacks: CallbackRegistry::new(),
            events: EventBus::new(),
        });

        Self {
            session: DeviceSession::new(connector, credential, product, config),
            address,
            shared,
        }
    }

    /// Returns the device serial.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.shared.serial
    }

    /// Returns the product type.
    #[must_use]
    pub fn product_type(&self) -> &ProductType {
        self.session.product()
    }

    /// Connects to the device.
    ///
    /// `manual` overrides the address given to the builder. Without either,
    /// the device is located on the local network. Returns once the session
    /// is subscribed; the first state snapshot follows shortly after.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::AlreadyConnected` if connected,
    /// `DiscoveryError` if the device cannot be located, and
    /// `ProtocolError::AuthenticationFailed` if it refuses the credential.
    pub async fn connect(&self, manual: Option<&str>) -> Result<()> {
        let manual = manual.or(self.address.as_deref());
        let shared = Arc::clone(&self.shared);
        let sink: EventSink = Arc::new(move |event| shared.handle(event));
        self.session.connect(manual, sink).await
    }

    /// Disconnects. Stops any pending reconnection; idempotent.
    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    /// Returns true if commands can be sent.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.state().is_subscribed()
    }

    /// Returns the session state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Returns a receiver observing session state changes.
    #[must_use]
    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.session.watch_state()
    }

    /// Returns the location of the last connection attempt.
    #[must_use]
    pub fn location(&self) -> Option<NetworkLocation> {
        self.session.location()
    }

    /// Sends a configuration.
    ///
    /// The configuration is validated against the product before anything
    /// is published. The device confirms by reporting its new state; this
    /// call does not wait for it.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if the configuration is invalid for the
    /// product, `DeviceError::InvalidTransition` if a 360 Eye lifecycle
    /// command does not fit the cleaning phase, and
    /// `ProtocolError::NotConnected` unless the session is subscribed.
    pub fn send_configuration(&self, configuration: &Configuration) -> Result<()> {
        let current = self.state();
        let command = configuration.build(
            self.product_type(),
            self.serial(),
            current.as_deref(),
            Utc::now(),
        )?;

        if let Some(lifecycle) = configuration.lifecycle() {
            let phase = current
                .as_deref()
                .and_then(DeviceState::as_vacuum)
                .map(VacuumState::phase);
            state::check_transition(phase, lifecycle)?;
        }

        self.publish(&command)
    }

    /// Starts a clean (360 Eye).
    ///
    /// # Errors
    ///
    /// See [`send_configuration`](Self::send_configuration).
    pub fn start(&self) -> Result<()> {
        self.lifecycle(VacuumCommand::Start)
    }

    /// Pauses the running clean (360 Eye).
    ///
    /// # Errors
    ///
    /// See [`send_configuration`](Self::send_configuration).
    pub fn pause(&self) -> Result<()> {
        self.lifecycle(VacuumCommand::Pause)
    }

    /// Resumes a paused clean (360 Eye).
    ///
    /// # Errors
    ///
    /// See [`send_configuration`](Self::send_configuration).
    pub fn resume(&self) -> Result<()> {
        self.lifecycle(VacuumCommand::Resume)
    }

    /// Aborts the clean; the robot returns to its dock (360 Eye).
    ///
    /// # Errors
    ///
    /// See [`send_configuration`](Self::send_configuration).
    pub fn abort(&self) -> Result<()> {
        self.lifecycle(VacuumCommand::Abort)
    }

    /// Sets the suction power (360 Eye).
    ///
    /// # Errors
    ///
    /// See [`send_configuration`](Self::send_configuration).
    pub fn set_power_mode(&self, mode: PowerMode) -> Result<()> {
        self.send_configuration(&Configuration::new().with_power_mode(mode))
    }

    fn lifecycle(&self, command: VacuumCommand) -> Result<()> {
        self.send_configuration(&Configuration::new().with_lifecycle(command))
    }

    /// Asks the device for a full state snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NotConnected` unless the session is subscribed.
    pub fn request_current_state(&self) -> Result<()> {
        self.publish(&OutboundCommand::request_current_state(
            self.serial(),
            Utc::now(),
        ))
    }

    /// Asks a fan for its sensor readings.
    ///
    /// Connected fans are polled automatically at the refresh interval.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnsupportedProduct` for the 360 Eye and
    /// `ProtocolError::NotConnected` unless the session is subscribed.
    pub fn request_environmental_state(&self) -> Result<()> {
        let product = self.product_type();
        if !product.is_fan() {
            return Err(DeviceError::UnsupportedProduct {
                operation: "environmental data",
                product: product.to_string(),
            }
            .into());
        }
        self.publish(&OutboundCommand::request_environmental_data(
            self.serial(),
            Utc::now(),
        ))
    }

    fn publish(&self, command: &OutboundCommand) -> Result<()> {
        self.session.publish(command)?;
        Ok(())
    }

    /// Returns the last known state, `None` before the first report.
    #[must_use]
    pub fn state(&self) -> Option<Arc<DeviceState>> {
        self.shared.state.borrow().clone()
    }

    /// Returns the last environmental readings (fans).
    #[must_use]
    pub fn environment(&self) -> Option<Arc<EnvironmentalState>> {
        self.shared.environment.borrow().clone()
    }

    /// Returns the last assembled map (360 Eye). Kept after disconnecting.
    #[must_use]
    pub fn last_map(&self) -> Option<Arc<AssembledMap>> {
        self.shared.map.borrow().clone()
    }

    /// Returns a receiver observing state snapshots.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<Option<Arc<DeviceState>>> {
        self.shared.state.subscribe()
    }

    /// Returns a receiver observing environmental readings.
    #[must_use]
    pub fn watch_environment(&self) -> watch::Receiver<Option<Arc<EnvironmentalState>>> {
        self.shared.environment.subscribe()
    }

    /// Subscribes to the event stream.
    ///
    /// Receivers that fall behind lose the oldest events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(feature = "mqtt")]
impl Device<MqttConnector> {
    /// Creates a builder for a device from its account record.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError` if the local credential cannot be decrypted.
    pub fn builder(record: &AccountDeviceRecord) -> Result<DeviceBuilder<MqttConnector>> {
        DeviceBuilder::from_record(record, MqttConnector::new())
    }

    /// Creates a device with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError` if the local credential cannot be decrypted.
    pub fn from_record(record: &AccountDeviceRecord) -> Result<Self> {
        Ok(Self::builder(record)?.build())
    }
}

impl<C: Connector> Subscribable for Device<C> {
    fn add_listener<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.shared.callbacks.add_listener(callback)
    }

    fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.shared.callbacks.remove_listener(id)
    }
}

impl<C: Connector> fmt::Debug for Device<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("serial", &self.serial())
            .field("product", self.product_type())
            .field("session", &self.session_state())
            .field("listeners", &self.shared.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Runs on the session task, in arrival order.
    fn handle(&self, event: SessionEvent) {
        let events = match event {
            SessionEvent::Message(payload) => self.ingest(&payload),
            SessionEvent::Tick(now) => self.advance(|machine| machine.tick(now)),
            SessionEvent::Connected => vec![DeviceEvent::Connected],
            SessionEvent::Degraded { attempt, reason } => {
                vec![DeviceEvent::ConnectionDegraded { attempt, reason }]
            }
            SessionEvent::Restored => vec![DeviceEvent::ConnectionRestored],
            SessionEvent::Closed { reason } => vec![DeviceEvent::Disconnected { reason }],
        };

        for event in events {
            self.callbacks.dispatch(&event);
            self.events.publish(event);
        }
    }

    fn ingest(&self, payload: &[u8]) -> Vec<DeviceEvent> {
        match telemetry::decode(payload) {
            Ok(message) => {
                tracing::trace!(serial = %self.serial, msg = %message.msg_type(), "Applying message");
                self.advance(|machine| machine.apply(message, Instant::now()))
            }
            Err(e) => {
                tracing::warn!(serial = %self.serial, error = %e, "Dropping undecodable payload");
                vec![DeviceEvent::DecodeFailed {
                    error: e.to_string(),
                }]
            }
        }
    }

    /// Runs one state machine step and publishes the resulting snapshots
    /// before any listener sees the step's events.
    fn advance<F>(&self, step: F) -> Vec<DeviceEvent>
    where
        F: FnOnce(&mut StateMachine) -> Vec<DeviceEvent>,
    {
        let mut machine = self.machine.lock();
        let events = step(&mut machine);
        replace_snapshot(&self.state, machine.state());
        replace_snapshot(&self.environment, machine.environment());
        replace_snapshot(&self.map, machine.last_map());
        events
    }
}

/// Notifies watchers only when the snapshot is a different one.
fn replace_snapshot<T>(sender: &watch::Sender<Option<Arc<T>>>, next: Option<Arc<T>>) {
    sender.send_if_modified(|current| {
        let changed = match (current.as_ref(), next.as_ref()) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        };
        if changed {
            *current = next;
        }
        changed
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommandError, Error, ProtocolError};
    use crate::protocol::{ConnectRequest, Frame, Inbound, Publisher};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Offline;

    struct Silent;

    impl Publisher for Silent {
        fn publish(
            &self,
            _: &str,
            _: Vec<u8>,
            _: crate::protocol::Delivery,
        ) -> std::result::Result<(), ProtocolError> {
            Ok(())
        }
        fn close(&self) {}
    }

    impl Inbound for Silent {
        async fn recv(&mut self) -> Frame {
            std::future::pending().await
        }
    }

    impl Connector for Offline {
        type Publisher = Silent;
        type Inbound = Silent;

        async fn open(
            &self,
            _: &NetworkLocation,
            _: Duration,
        ) -> std::result::Result<(), ProtocolError> {
            Err(ProtocolError::ConnectionFailed("offline".to_string()))
        }

        async fn authenticate(
            &self,
            _: ConnectRequest<'_>,
        ) -> std::result::Result<(Silent, Silent), ProtocolError> {
            Err(ProtocolError::ConnectionFailed("offline".to_string()))
        }
    }

    fn device(product: ProductType) -> Device<Offline> {
        Device::new(
            ResolvedCredential::new("NN2-EU-KJA1234A", "secret"),
            product,
            Offline,
            DeviceConfig::default(),
            None,
        )
    }

    fn message(device: &Device<Offline>, payload: &str) {
        device
            .shared
            .handle(SessionEvent::Message(payload.as_bytes().to_vec()));
    }

    const CURRENT_STATE: &str = r#"{"msg":"CURRENT-STATE","time":"2017-06-20T12:00:00Z",
        "product-state":{"fmod":"FAN","fnsp":"0002","oson":"ON","nmod":"OFF",
        "qtar":"0003","rhtm":"ON","filf":"2159","ercd":"NONE","wacd":"NONE","sltm":"OFF"}}"#;

    #[test]
    fn new_device_has_no_state() {
        let device = device(ProductType::PureCoolLinkTower);
        assert_eq!(device.serial(), "NN2-EU-KJA1234A");
        assert!(device.state().is_none());
        assert!(device.environment().is_none());
        assert!(device.last_map().is_none());
        assert_eq!(device.session_state(), SessionState::Disconnected);
        assert!(!device.is_connected());
    }

    #[test]
    fn messages_update_snapshot_and_notify() {
        let device = device(ProductType::PureCoolLinkTower);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        device.on_state_changed(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut watcher = device.watch_state();

        message(&device, CURRENT_STATE);

        let state = device.state().unwrap();
        let fan = state.as_fan().unwrap();
        assert_eq!(fan.speed().value(), Some(2));
        assert!(fan.oscillation());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(watcher.has_changed().unwrap());
    }

    #[test]
    fn snapshot_is_replaced_not_mutated() {
        let device = device(ProductType::PureCoolLinkTower);
        message(&device, CURRENT_STATE);
        let before = device.state().unwrap();

        message(
            &device,
            r#"{"msg":"STATE-CHANGE","time":"2017-06-20T12:01:00Z",
                "product-state":{"fnsp":["0002","0007"]}}"#,
        );

        let after = device.state().unwrap();
        assert_eq!(before.as_fan().unwrap().speed().value(), Some(2));
        assert_eq!(after.as_fan().unwrap().speed().value(), Some(7));
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn undecodable_payload_keeps_state() {
        let device = device(ProductType::PureCoolLinkTower);
        message(&device, CURRENT_STATE);
        let before = device.state().unwrap();
        let mut events = device.subscribe_events();

        message(&device, "{not json");

        assert!(Arc::ptr_eq(&before, &device.state().unwrap()));
        assert!(matches!(
            events.try_recv(),
            Ok(DeviceEvent::DecodeFailed { .. })
        ));
    }

    #[test]
    fn connection_events_reach_listeners() {
        let device = device(ProductType::PureCoolLinkTower);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        device.on_connection_changed(move |event| log.lock().push(format!("{event:?}")));

        device.shared.handle(SessionEvent::Connected);
        device.shared.handle(SessionEvent::Degraded {
            attempt: 1,
            reason: "reset".to_string(),
        });
        device.shared.handle(SessionEvent::Restored);
        device.shared.handle(SessionEvent::Closed { reason: None });

        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert!(seen[1].contains("ConnectionDegraded"));
    }

    #[test]
    fn configuration_is_validated_before_connection_check() {
        let device = device(ProductType::PureCoolLinkTower);

        let err = device.send_configuration(&Configuration::new()).unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::Empty)));

        let err = device
            .send_configuration(&Configuration::new().with_focus_mode(true))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Command(CommandError::Unsupported { .. })
        ));

        let err = device
            .send_configuration(&Configuration::new().with_oscillation(true))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::NotConnected)));
    }

    #[test]
    fn vacuum_lifecycle_is_checked_against_phase() {
        let device = device(ProductType::Eye360);

        let err = device.pause().unwrap_err();
        assert!(matches!(
            err,
            Error::Device(DeviceError::InvalidTransition { command: "pause", .. })
        ));

        // Start is allowed with nothing known; it fails only on the link.
        let err = device.start().unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::NotConnected)));
    }

    #[test]
    fn environmental_request_is_fan_only() {
        let device = device(ProductType::Eye360);
        let err = device.request_environmental_state().unwrap_err();
        assert!(matches!(
            err,
            Error::Device(DeviceError::UnsupportedProduct { .. })
        ));
    }

    #[tokio::test]
    async fn failed_connect_reports_error() {
        let device = device(ProductType::PureCoolLinkTower);
        let result = device.connect(Some("10.0.0.5:1883")).await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::ConnectionFailed(_)))
        ));
        assert_eq!(device.session_state(), SessionState::Disconnected);
        assert_eq!(
            device.location().map(|l| l.to_string()),
            Some("10.0.0.5:1883".to_string())
        );
    }
}
