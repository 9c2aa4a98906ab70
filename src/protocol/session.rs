// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistent device session.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::command::OutboundCommand;
use crate::config::DeviceConfig;
use crate::credential::ResolvedCredential;
use crate::discovery::{DeviceLocator, LocationSource, NetworkLocation};
use crate::error::{DiscoveryError, Error, ProtocolError};
use crate::protocol::{ConnectRequest, Connector, Frame, Inbound, Publisher, SessionState};
use crate::types::ProductType;

/// What the session reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A payload arrived on the status topic.
    Message(Vec<u8>),
    /// The session reached `Subscribed` after `connect`.
    Connected,
    /// The link was lost; a reconnection attempt is about to run.
    Degraded {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Why the link was lost or the previous attempt failed.
        reason: String,
    },
    /// The link was re-established.
    Restored,
    /// The session ended. `None` after an explicit disconnect.
    Closed {
        /// Why the session ended.
        reason: Option<String>,
    },
    /// Periodic refresh tick.
    Tick(Instant),
}

/// Receiver of session events. Called from the session task.
pub type EventSink = Arc<dyn Fn(SessionEvent) + Send + Sync>;

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// How the receive loop ended.
enum Exit {
    Shutdown,
    Lost(String),
}

/// How a reconnection run ended.
enum Reconnect<I> {
    Restored(I),
    Shutdown,
    Failed(String),
}

struct Shared<C: Connector> {
    connector: C,
    locator: DeviceLocator,
    config: DeviceConfig,
    credential: ResolvedCredential,
    product: ProductType,
    state: watch::Sender<SessionState>,
    publisher: RwLock<Option<Arc<C::Publisher>>>,
    location: RwLock<Option<NetworkLocation>>,
}

/// One authenticated link to a device, kept alive in the background.
///
/// `connect` establishes the link and starts a task that delivers inbound
/// payloads, runs the periodic refresh and re-establishes the link after
/// unexpected drops. `disconnect` stops the task, including a pending
/// reconnection backoff.
pub struct DeviceSession<C: Connector> {
    shared: Arc<Shared<C>>,
    task: Mutex<Option<Running>>,
}

impl<C: Connector> DeviceSession<C> {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(
        connector: C,
        credential: ResolvedCredential,
        product: ProductType,
        config: DeviceConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let mut discovery = config.discovery.clone();
        discovery.default_port = config.port;
        Self {
            shared: Arc::new(Shared {
                connector,
                locator: DeviceLocator::new(discovery),
                config,
                credential,
                product,
                state,
                publisher: RwLock::new(None),
                location: RwLock::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Returns the device serial.
    #[must_use]
    pub fn serial(&self) -> &str {
        self.shared.credential.serial()
    }

    /// Returns the product type.
    #[must_use]
    pub fn product(&self) -> &ProductType {
        &self.shared.product
    }

    /// Returns the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Returns a receiver that observes session state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Returns the last location used to reach the device.
    #[must_use]
    pub fn location(&self) -> Option<NetworkLocation> {
        self.shared.location.read().clone()
    }

    /// Connects and starts the background session task.
    ///
    /// With `manual` set, the address is used as is; otherwise the device
    /// is located on the network, falling back to the last known location
    /// if it does not answer. Once subscribed, a current state request is
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::AlreadyConnected` if a session is active,
    /// `DiscoveryError` if the device cannot be located, and
    /// `ProtocolError::AuthenticationFailed` (not retried) or another
    /// `ProtocolError` if the link cannot be established.
    pub async fn connect(&self, manual: Option<&str>, sink: EventSink) -> Result<(), Error> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            return Err(ProtocolError::AlreadyConnected.into());
        }

        let shared = &self.shared;
        let location = shared.resolve_location(manual).await?;
        let inbound = match shared.establish(&location, true).await {
            Ok(inbound) => inbound,
            Err(e) => {
                shared.set_state(SessionState::Disconnected);
                tracing::warn!(serial = %shared.serial(), error = %e, "Connection failed");
                return Err(e.into());
            }
        };

        sink(SessionEvent::Connected);
        shared.request_current_state();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_session(Arc::clone(shared), inbound, shutdown_rx, sink));
        *task = Some(Running { shutdown, handle });
        Ok(())
    }

    /// Ends the session. Safe to call in any state, any number of times.
    pub async fn disconnect(&self) {
        let running = self.task.lock().await.take();
        if let Some(Running { shutdown, handle }) = running {
            // The task may have ended on its own.
            let _ = shutdown.send(true);
            if let Err(e) = handle.await
                && e.is_panic()
            {
                tracing::warn!(serial = %self.serial(), "Session task panicked");
            }
        }

        self.shared.drop_publisher();
        self.shared.set_state(SessionState::Disconnected);
    }

    /// Publishes a command on the device's command topic.
    ///
    /// Delivery is transport-level only; the device confirms by reporting
    /// its new state.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::NotConnected` unless the session is subscribed.
    pub fn publish(&self, command: &OutboundCommand) -> Result<(), ProtocolError> {
        self.shared.send(command)
    }
}

impl<C: Connector> fmt::Debug for DeviceSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("serial", &self.serial())
            .field("state", &self.state())
            .field("location", &self.location())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for DeviceSession<C> {
    fn drop(&mut self) {
        if let Some(running) = self.task.get_mut().take() {
            let _ = running.shutdown.send(true);
        }
    }
}

impl<C: Connector> Shared<C> {
    fn serial(&self) -> &str {
        self.credential.serial()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(serial = %self.serial(), from = %previous, to = %state, "Session state");
        }
    }

    async fn resolve_location(&self, manual: Option<&str>) -> Result<NetworkLocation, Error> {
        let timeout = self.config.discovery.timeout;
        match self.locator.locate(self.serial(), timeout, manual).await {
            Ok(location) => {
                *self.location.write() = Some(location.clone());
                Ok(location)
            }
            Err(DiscoveryError::NotFound { serial }) => {
                let cached = self.location.read().clone();
                match cached {
                    Some(location) => {
                        tracing::warn!(serial = %serial, location = %location, "Device not found, using last known location");
                        Ok(location)
                    }
                    None => Err(DiscoveryError::NotFound { serial }.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-uses a manual location; runs discovery again for a discovered one.
    async fn relocate(&self) -> Result<NetworkLocation, Error> {
        let cached = self.location.read().clone();
        match cached {
            Some(location) if location.source == LocationSource::Manual => Ok(location),
            _ => self.resolve_location(None).await,
        }
    }

    /// Opens, authenticates and subscribes. `announce` publishes the
    /// intermediate states; reconnection keeps `Reconnecting` instead.
    async fn establish(
        &self,
        location: &NetworkLocation,
        announce: bool,
    ) -> Result<C::Inbound, ProtocolError> {
        let timeout = self.config.connect_timeout;

        if announce {
            self.set_state(SessionState::Connecting);
        }
        self.connector.open(location, timeout).await?;

        if announce {
            self.set_state(SessionState::Authenticating);
        }
        let status_topic = self.product.status_topic(self.serial());
        let request = ConnectRequest {
            location,
            credential: &self.credential,
            status_topic: &status_topic,
            keep_alive: self.config.keep_alive,
            timeout,
        };
        let (publisher, inbound) = self.connector.authenticate(request).await?;

        *self.publisher.write() = Some(Arc::new(publisher));
        self.set_state(SessionState::Subscribed);
        tracing::info!(serial = %self.serial(), location = %location, topic = %status_topic, "Subscribed");
        Ok(inbound)
    }

    fn drop_publisher(&self) {
        if let Some(publisher) = self.publisher.write().take() {
            publisher.close();
        }
    }

    fn send(&self, command: &OutboundCommand) -> Result<(), ProtocolError> {
        if !self.state.borrow().is_subscribed() {
            return Err(ProtocolError::NotConnected);
        }
        let publisher = self
            .publisher
            .read()
            .clone()
            .ok_or(ProtocolError::NotConnected)?;

        let topic = self.product.command_topic(self.serial());
        let payload = command.encode();
        tracing::debug!(
            topic = %topic,
            msg = %command.message_type(),
            payload = %String::from_utf8_lossy(&payload),
            "Publishing command"
        );
        publisher.publish(&topic, payload, command.delivery())
    }

    fn request_current_state(&self) {
        let command = OutboundCommand::request_current_state(self.serial(), Utc::now());
        if let Err(e) = self.send(&command) {
            tracing::warn!(serial = %self.serial(), error = %e, "Failed to request current state");
        }
    }

    fn request_environment(&self) {
        let command = OutboundCommand::request_environmental_data(self.serial(), Utc::now());
        if let Err(e) = self.send(&command) {
            tracing::warn!(serial = %self.serial(), error = %e, "Failed to request sensor data");
        }
    }

    /// Delivers inbound frames and runs the refresh until the link drops or
    /// shutdown is requested.
    async fn receive(
        &self,
        inbound: &mut C::Inbound,
        shutdown: &mut watch::Receiver<bool>,
        sink: &EventSink,
    ) -> Exit {
        let period = self.config.refresh_interval;
        let mut refresh = tokio::time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return Exit::Shutdown,
                frame = inbound.recv() => match frame {
                    Frame::Message { topic, payload } => {
                        tracing::debug!(topic = %topic, bytes = payload.len(), "Inbound payload");
                        sink(SessionEvent::Message(payload));
                    }
                    Frame::Closed(reason) => return Exit::Lost(reason),
                },
                now = refresh.tick() => {
                    if self.product.is_fan() {
                        self.request_environment();
                    }
                    sink(SessionEvent::Tick(now));
                }
            }
        }
    }

    async fn reconnect(
        &self,
        mut reason: String,
        shutdown: &mut watch::Receiver<bool>,
        sink: &EventSink,
    ) -> Reconnect<C::Inbound> {
        let policy = &self.config.reconnection;
        let mut attempt: u32 = 0;

        loop {
            if !policy.should_retry(attempt) {
                return Reconnect::Failed(format!("gave up after {attempt} attempts: {reason}"));
            }
            attempt += 1;

            self.set_state(SessionState::Reconnecting { attempt });
            tracing::warn!(serial = %self.serial(), attempt, reason = %reason, "Reconnecting");
            sink(SessionEvent::Degraded {
                attempt,
                reason: reason.clone(),
            });

            let delay = policy.delay_for_attempt(attempt - 1);
            let step = async {
                tokio::time::sleep(delay).await;
                let location = self.relocate().await?;
                self.establish(&location, false).await.map_err(Error::from)
            };

            let result = tokio::select! {
                _ = shutdown.changed() => return Reconnect::Shutdown,
                result = step => result,
            };

            match result {
                Ok(inbound) => {
                    tracing::info!(serial = %self.serial(), attempt, "Connection restored");
                    sink(SessionEvent::Restored);
                    self.request_current_state();
                    return Reconnect::Restored(inbound);
                }
                Err(Error::Protocol(ProtocolError::AuthenticationFailed(message))) => {
                    tracing::error!(serial = %self.serial(), error = %message, "Authentication refused while reconnecting");
                    return Reconnect::Failed(format!("authentication failed: {message}"));
                }
                Err(e) => reason = e.to_string(),
            }
        }
    }
}

/// Background task: the only consumer of the inbound stream.
async fn run_session<C: Connector>(
    shared: Arc<Shared<C>>,
    mut inbound: C::Inbound,
    mut shutdown: watch::Receiver<bool>,
    sink: EventSink,
) {
    let reason = loop {
        match shared.receive(&mut inbound, &mut shutdown, &sink).await {
            Exit::Shutdown => break None,
            Exit::Lost(reason) => {
                shared.drop_publisher();
                match shared.reconnect(reason, &mut shutdown, &sink).await {
                    Reconnect::Restored(next) => inbound = next,
                    Reconnect::Shutdown => break None,
                    Reconnect::Failed(reason) => break Some(reason),
                }
            }
        }
    };

    shared.drop_publisher();
    shared.set_state(SessionState::Disconnected);
    match &reason {
        Some(reason) => tracing::warn!(serial = %shared.serial(), reason = %reason, "Session ended"),
        None => tracing::info!(serial = %shared.serial(), "Disconnected"),
    }
    sink(SessionEvent::Closed { reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Connector for a device that never answers.
    struct Unreachable;

    struct NoPublisher;

    impl Publisher for NoPublisher {
        fn publish(&self, _: &str, _: Vec<u8>, _: crate::protocol::Delivery) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn close(&self) {}
    }

    struct NoInbound;

    impl Inbound for NoInbound {
        async fn recv(&mut self) -> Frame {
            std::future::pending().await
        }
    }

    impl Connector for Unreachable {
        type Publisher = NoPublisher;
        type Inbound = NoInbound;

        async fn open(&self, location: &NetworkLocation, _: Duration) -> Result<(), ProtocolError> {
            Err(ProtocolError::ConnectionFailed(format!("{location} unreachable")))
        }

        async fn authenticate(
            &self,
            _: ConnectRequest<'_>,
        ) -> Result<(NoPublisher, NoInbound), ProtocolError> {
            unreachable!("open always fails")
        }
    }

    fn session() -> DeviceSession<Unreachable> {
        DeviceSession::new(
            Unreachable,
            ResolvedCredential::new("NN2-EU-KJA1234A", "secret"),
            ProductType::PureCoolLinkTower,
            DeviceConfig::default(),
        )
    }

    #[test]
    fn publish_requires_subscription() {
        let session = session();
        let command = OutboundCommand::request_current_state("NN2-EU-KJA1234A", Utc::now());
        assert!(matches!(
            session.publish(&command),
            Err(ProtocolError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let session = session();
        let mut states = session.watch_state();

        let result = session.connect(Some("10.0.0.5"), Arc::new(|_| {})).await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::ConnectionFailed(_)))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(states.has_changed().unwrap());
        assert_eq!(session.location(), Some(NetworkLocation::manual("10.0.0.5", 1883)));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let session = session();
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
