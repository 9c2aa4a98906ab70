// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT link to a Dyson device.
//!
//! The device runs its own MQTT 3.1.1 broker. The client authenticates with
//! the serial as user name and the decrypted local password, subscribes to
//! the status topic and publishes on the command topic.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use crate::discovery::NetworkLocation;
use crate::error::ProtocolError;
use crate::protocol::{ConnectRequest, Connector, Delivery, Frame, Inbound, Publisher};

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 32;

/// Capacity of the inbound frame queue.
const FRAME_CAPACITY: usize = 64;

/// How long a closed link may take to send its DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// Opens MQTT links with `rumqttc`.
///
/// # Examples
///
/// ```no_run
/// use purelink::{AccountDeviceRecord, MqttDevice};
/// use purelink::protocol::MqttConnector;
///
/// # fn example(record: AccountDeviceRecord) -> purelink::Result<()> {
/// let device: MqttDevice = MqttDevice::builder(&record)?
///     .with_connector(MqttConnector::new().with_client_prefix("living-room"))
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MqttConnector {
    client_prefix: Option<String>,
}

impl MqttConnector {
    /// Creates a connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prefix of the generated client IDs.
    #[must_use]
    pub fn with_client_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_prefix = Some(prefix.into());
        self
    }

    fn client_id(&self) -> String {
        let prefix = self.client_prefix.as_deref().unwrap_or("purelink");
        format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
    }
}

impl Connector for MqttConnector {
    type Publisher = MqttPublisher;
    type Inbound = MqttInbound;

    async fn open(&self, location: &NetworkLocation, timeout: Duration) -> Result<(), ProtocolError> {
        let address = (location.address.as_str(), location.port);
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProtocolError::ConnectionFailed(format!("{location}: {e}"))),
            Err(_) => Err(ProtocolError::Timeout(millis(timeout))),
        }
    }

    async fn authenticate(
        &self,
        request: ConnectRequest<'_>,
    ) -> Result<(MqttPublisher, MqttInbound), ProtocolError> {
        let client_id = self.client_id();

        let mut options =
            MqttOptions::new(&client_id, request.location.address.clone(), request.location.port);
        options.set_keep_alive(request.keep_alive);
        options.set_clean_session(true);
        options.set_credentials(
            request.credential.serial(),
            request.credential.local_password(),
        );

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        let pump = tokio::spawn(handle_mqtt_events(event_loop, ready_tx, frame_tx)).abort_handle();

        // Queued until the CONNACK arrives.
        if let Err(e) = client.subscribe(request.status_topic, QoS::AtMostOnce).await {
            pump.abort();
            return Err(ProtocolError::Mqtt(e));
        }

        let outcome = match tokio::time::timeout(request.timeout, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolError::ChannelClosed(
                "event loop stopped before subscribing".to_string(),
            )),
            Err(_) => Err(ProtocolError::Timeout(millis(request.timeout))),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(client_id = %client_id, topic = %request.status_topic, "MQTT link ready");
                Ok((MqttPublisher { client, pump }, MqttInbound { frames: frame_rx }))
            }
            Err(e) => {
                pump.abort();
                Err(e)
            }
        }
    }
}

/// Outbound half of an MQTT link.
#[derive(Debug)]
pub struct MqttPublisher {
    client: AsyncClient,
    pump: AbortHandle,
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>, delivery: Delivery) -> Result<(), ProtocolError> {
        let qos = match delivery {
            Delivery::AtMostOnce => QoS::AtMostOnce,
            Delivery::AtLeastOnce => QoS::AtLeastOnce,
        };
        self.client
            .try_publish(topic, qos, false, payload)
            .map_err(ProtocolError::Mqtt)
    }

    fn close(&self) {
        // the link may already be gone
        let _ = self.client.try_disconnect();
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        // The pump stops by itself once the DISCONNECT is written.
        let pump = self.pump.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(DISCONNECT_GRACE).await;
                    pump.abort();
                });
            }
            Err(_) => pump.abort(),
        }
    }
}

/// Inbound half of an MQTT link.
#[derive(Debug)]
pub struct MqttInbound {
    frames: mpsc::Receiver<Frame>,
}

impl Inbound for MqttInbound {
    async fn recv(&mut self) -> Frame {
        self.frames
            .recv()
            .await
            .unwrap_or_else(|| Frame::Closed("event loop stopped".to_string()))
    }
}

/// Drives the event loop until the connection fails.
///
/// The first SUBACK (or the first failure) resolves `ready`; later failures
/// end the frame stream with [`Frame::Closed`].
async fn handle_mqtt_events(
    mut event_loop: EventLoop,
    ready: oneshot::Sender<Result<(), ProtocolError>>,
    frames: mpsc::Sender<Frame>,
) {
    let mut ready = Some(ready);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT connected");
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "Received MQTT message"
                );
                let frame = Frame::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let error = classify(e);
                match ready.take() {
                    Some(ready) => {
                        let _ = ready.send(Err(error));
                    }
                    None => {
                        tracing::warn!(error = %error, "MQTT link lost");
                        let _ = frames.send(Frame::Closed(error.to_string())).await;
                    }
                }
                break;
            }
        }
    }
}

fn classify(error: ConnectionError) -> ProtocolError {
    match error {
        ConnectionError::ConnectionRefused(
            code @ (ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized),
        ) => ProtocolError::AuthenticationFailed(format!("{code:?}")),
        other => ProtocolError::ConnectionFailed(other.to_string()),
    }
}

// Safe: timeouts are seconds, far below u64::MAX milliseconds
#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_credentials_are_authentication_failures() {
        let error = classify(ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword,
        ));
        assert!(matches!(error, ProtocolError::AuthenticationFailed(_)));

        let error = classify(ConnectionError::ConnectionRefused(
            ConnectReturnCode::NotAuthorized,
        ));
        assert!(matches!(error, ProtocolError::AuthenticationFailed(_)));
    }

    #[test]
    fn other_refusals_are_connection_failures() {
        let error = classify(ConnectionError::ConnectionRefused(
            ConnectReturnCode::ServiceUnavailable,
        ));
        assert!(matches!(error, ProtocolError::ConnectionFailed(_)));
    }

    #[test]
    fn client_ids_are_unique() {
        let connector = MqttConnector::new().with_client_prefix("test");
        let a = connector.client_id();
        let b = connector.client_id();
        assert!(a.starts_with("test-"));
        assert_ne!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_publisher_leaves_time_for_disconnect() {
        let options = MqttOptions::new("test", "127.0.0.1", 1883);
        let (client, _event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let pump = tokio::spawn(std::future::pending::<()>());

        drop(MqttPublisher {
            client,
            pump: pump.abort_handle(),
        });
        tokio::task::yield_now().await;
        assert!(!pump.is_finished());

        let started = tokio::time::Instant::now();
        assert!(pump.await.unwrap_err().is_cancelled());
        assert!(started.elapsed() >= DISCONNECT_GRACE);
    }

    #[tokio::test]
    async fn open_fails_on_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let location = NetworkLocation::manual("127.0.0.1", port);
        let result = MqttConnector::new()
            .open(&location, Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(ProtocolError::ConnectionFailed(_))));
    }
}
