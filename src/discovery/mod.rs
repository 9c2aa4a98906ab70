// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Locating devices on the local network.
//!
//! Dyson devices advertise an mDNS service (`_dyson_mqtt._tcp.local.`) whose
//! instance name embeds the serial, e.g. `475_NN2-EU-KJA1234A`. The locator
//! sends PTR queries to the multicast group and listens for answers, parsing
//! them leniently since the devices' records are not always well formed.
//!
//! A manually supplied address skips the network entirely.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use purelink::discovery::{DeviceLocator, LocationSource};
//!
//! # async fn example() -> purelink::Result<()> {
//! let locator = DeviceLocator::default();
//!
//! // Manual address: returned immediately
//! let location = locator
//!     .locate("NN2-EU-KJA1234A", Duration::from_secs(5), Some("10.0.0.5"))
//!     .await?;
//! assert_eq!(location.source, LocationSource::Manual);
//!
//! // Automatic: browse until the device answers or the timeout expires
//! let location = locator
//!     .locate("NN2-EU-KJA1234A", Duration::from_secs(15), None)
//!     .await?;
//! println!("found at {location}");
//! # Ok(())
//! # }
//! ```

mod dns;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::DEFAULT_PORT;
use crate::error::DiscoveryError;

const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const MDNS_PORT: u16 = 5353;

/// Service type advertised by Dyson devices.
pub const DYSON_SERVICE: &str = "_dyson_mqtt._tcp.local.";

/// How a location was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationSource {
    /// Found through mDNS.
    Discovered,
    /// Supplied by the caller.
    Manual,
}

/// Where to reach a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkLocation {
    /// Host name or IP address.
    pub address: String,
    /// MQTT port.
    pub port: u16,
    /// How the location was obtained.
    pub source: LocationSource,
}

impl NetworkLocation {
    /// Creates a manual location.
    #[must_use]
    pub fn manual(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            source: LocationSource::Manual,
        }
    }

    /// Parses a manual address, `host` or `host:port`.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::InvalidAddress` if the host is empty or the
    /// port is not a number.
    pub fn parse_manual(address: &str, default_port: u16) -> Result<Self, DiscoveryError> {
        let address = address.trim();
        if let Ok(socket) = address.parse::<SocketAddr>() {
            return Ok(Self::manual(socket.ip().to_string(), socket.port()));
        }
        if address.parse::<IpAddr>().is_ok() {
            return Ok(Self::manual(address, default_port));
        }

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| DiscoveryError::InvalidAddress(format!("invalid port in {address:?}")))?;
                (host, port)
            }
            None => (address, default_port),
        };

        if host.is_empty() {
            return Err(DiscoveryError::InvalidAddress(format!("no host in {address:?}")));
        }

        Ok(Self::manual(host, port))
    }
}

impl fmt::Display for NetworkLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Options for mDNS discovery.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use purelink::discovery::DiscoveryOptions;
///
/// let options = DiscoveryOptions::new()
///     .with_timeout(Duration::from_secs(10))
///     .with_probe_interval(Duration::from_secs(2));
/// assert_eq!(options.service_type, "_dyson_mqtt._tcp.local.");
/// ```
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Service type to browse.
    pub service_type: String,
    /// Interval between queries.
    pub probe_interval: Duration,
    /// Total time to wait for the device.
    pub timeout: Duration,
    /// How long to keep listening after a first match, for later answers.
    pub settle: Duration,
    /// Port used when an answer carries none.
    pub default_port: u16,
}

impl DiscoveryOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service type.
    #[must_use]
    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Sets the interval between queries.
    #[must_use]
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the total discovery timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the settle window after a first match.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            service_type: DYSON_SERVICE.to_string(),
            probe_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(15),
            settle: Duration::from_millis(500),
            default_port: DEFAULT_PORT,
        }
    }
}

/// Finds a device's network address.
#[derive(Debug, Clone, Default)]
pub struct DeviceLocator {
    options: DiscoveryOptions,
}

impl DeviceLocator {
    /// Creates a locator.
    #[must_use]
    pub fn new(options: DiscoveryOptions) -> Self {
        Self { options }
    }

    /// Returns the discovery options.
    #[must_use]
    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Locates the device with `serial`.
    ///
    /// With `manual` set, the address is parsed and returned without any
    /// network traffic. Otherwise the local network is browsed until the
    /// device answers or `timeout` expires; if several answers arrive, the
    /// most recent wins.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::NotFound` if no answer matched before the
    /// timeout, `InvalidAddress` for a malformed manual address, or `Io` if
    /// the discovery socket could not be set up.
    pub async fn locate(
        &self,
        serial: &str,
        timeout: Duration,
        manual: Option<&str>,
    ) -> Result<NetworkLocation, DiscoveryError> {
        if let Some(address) = manual {
            let location = NetworkLocation::parse_manual(address, self.options.default_port)?;
            tracing::debug!(serial = %serial, location = %location, "Using manual address");
            return Ok(location);
        }

        self.browse(serial, timeout).await
    }

    async fn browse(&self, serial: &str, timeout: Duration) -> Result<NetworkLocation, DiscoveryError> {
        let socket = bind_socket().await?;
        let query = dns::build_query(&self.options.service_type);
        let target = SocketAddr::from((MDNS_GROUP, MDNS_PORT));

        let deadline = Instant::now() + timeout;
        let mut probe = tokio::time::interval(self.options.probe_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut found: Option<(NetworkLocation, Instant)> = None;
        let mut attempts = 0u32;
        let mut buf = vec![0u8; 9000];

        tracing::debug!(serial = %serial, service = %self.options.service_type, "Browsing for device");

        loop {
            let wake = found
                .as_ref()
                .map_or(deadline, |(_, at)| (*at + self.options.settle).min(deadline));

            tokio::select! {
                () = tokio::time::sleep_until(wake) => {
                    return match found {
                        Some((location, _)) => {
                            tracing::info!(serial = %serial, location = %location, "Device located");
                            Ok(location)
                        }
                        None => {
                            tracing::warn!(serial = %serial, attempts, "Device not found");
                            Err(DiscoveryError::NotFound { serial: serial.to_string() })
                        }
                    };
                }
                _ = probe.tick() => {
                    attempts += 1;
                    if attempts > 1 {
                        tracing::debug!(serial = %serial, attempt = attempts, "Re-probing");
                    }
                    if let Err(e) = socket.send_to(&query, target).await {
                        tracing::warn!(error = %e, "Failed to send mDNS query");
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, source) = received?;
                    if let Some(location) = self.match_response(serial, &buf[..len], source.ip()) {
                        if found.as_ref().is_some_and(|(known, _)| *known != location) {
                            tracing::warn!(serial = %serial, location = %location, "Device answered from another address");
                        }
                        found = Some((location, Instant::now()));
                    }
                }
            }
        }
    }

    fn match_response(&self, serial: &str, packet: &[u8], source: IpAddr) -> Option<NetworkLocation> {
        let records = dns::parse_records(packet);
        dns::advertisements(&records, &self.options.service_type, source)
            .into_iter()
            .filter(|ad| ad.serial.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(serial)))
            .last()
            .map(|ad| NetworkLocation {
                address: ad.address.to_string(),
                port: ad.port.unwrap_or(self.options.default_port),
                source: LocationSource::Discovered,
            })
    }
}

/// Binds the mDNS port when free, an ephemeral port otherwise. Queries ask
/// for unicast answers so either works.
async fn bind_socket() -> Result<UdpSocket, DiscoveryError> {
    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, MDNS_PORT)).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::debug!(error = %e, "mDNS port busy, using an ephemeral port");
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?
        }
    };

    if let Err(e) = socket.join_multicast_v4(MDNS_GROUP, Ipv4Addr::UNSPECIFIED) {
        tracing::warn!(error = %e, "Could not join the mDNS group, relying on unicast answers");
    }

    Ok(socket)
}
