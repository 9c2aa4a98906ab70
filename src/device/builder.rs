// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device builder.

use crate::account::AccountDeviceRecord;
use crate::config::DeviceConfig;
use crate::credential::ResolvedCredential;
use crate::device::Device;
use crate::error::Result;
use crate::protocol::Connector;
use crate::types::ProductType;

/// Builder for [`Device`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use purelink::{AccountDeviceRecord, DeviceConfig, MqttDevice, ReconnectionPolicy};
///
/// # fn example(record: AccountDeviceRecord) -> purelink::Result<()> {
/// let device = MqttDevice::builder(&record)?
///     .with_address("192.168.1.42")
///     .with_config(
///         DeviceConfig::new()
///             .with_refresh_interval(Duration::from_secs(10))
///             .with_reconnection(ReconnectionPolicy::new().with_max_retries(5)),
///     )
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DeviceBuilder<C> {
    credential: ResolvedCredential,
    product: ProductType,
    connector: C,
    config: DeviceConfig,
    address: Option<String>,
}

impl<C: Connector> DeviceBuilder<C> {
    /// Creates a builder from an already resolved credential.
    #[must_use]
    pub fn new(credential: ResolvedCredential, product: ProductType, connector: C) -> Self {
        Self {
            credential,
            product,
            connector,
            config: DeviceConfig::default(),
            address: None,
        }
    }

    /// Creates a builder from an account record, decrypting its credential.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError` if the local credential cannot be decrypted.
    pub fn from_record(record: &AccountDeviceRecord, connector: C) -> Result<Self> {
        let credential = ResolvedCredential::resolve(record)?;
        Ok(Self::new(credential, record.product_type.clone(), connector))
    }

    /// Replaces the transport.
    #[must_use]
    pub fn with_connector<D: Connector>(self, connector: D) -> DeviceBuilder<D> {
        DeviceBuilder {
            credential: self.credential,
            product: self.product,
            connector,
            config: self.config,
            address: self.address,
        }
    }

    /// Sets the connection settings.
    #[must_use]
    pub fn with_config(mut self, config: DeviceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a fixed address (`host`, `host:port` or `ip`), skipping discovery.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Builds a disconnected device.
    #[must_use]
    pub fn build(self) -> Device<C> {
        Device::new(
            self.credential,
            self.product,
            self.connector,
            self.config,
            self.address,
        )
    }
}
