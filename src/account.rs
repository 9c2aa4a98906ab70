// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device records from the Dyson account service.
//!
//! The account service itself is not part of this crate. Callers fetch the
//! device manifest however they like and hand the JSON (or the already
//! deserialized records) to [`Device::from_record`](crate::Device::from_record).

use serde::{Deserialize, Deserializer};

use crate::error::ParseError;
use crate::types::ProductType;

/// One device entry of the account manifest.
///
/// # Examples
///
/// ```
/// use purelink::account::parse_manifest;
/// use purelink::types::ProductType;
///
/// let json = r#"[{
///     "Serial": "NN2-EU-KJA1234A",
///     "Name": "Bedroom",
///     "LocalCredentials": "c2VjcmV0",
///     "ProductType": "475",
///     "Version": "21.03.08",
///     "Active": true,
///     "AutoUpdate": true,
///     "NewVersionAvailable": false
/// }]"#;
///
/// let records = parse_manifest(json).unwrap();
/// assert_eq!(records[0].serial, "NN2-EU-KJA1234A");
/// assert_eq!(records[0].product_type, ProductType::PureCoolLinkTower);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountDeviceRecord {
    /// Device serial, used as MQTT identity and discovery key.
    pub serial: String,
    /// Friendly name given in the companion app.
    pub name: String,
    /// Base64 blob holding the encrypted local password.
    pub local_credentials: String,
    /// Product family.
    #[serde(deserialize_with = "product_from_code")]
    pub product_type: ProductType,
    /// Firmware version.
    #[serde(default)]
    pub version: Option<String>,
    /// Whether the device is active on the account.
    #[serde(default)]
    pub active: Option<bool>,
    /// Whether automatic firmware updates are enabled.
    #[serde(default)]
    pub auto_update: Option<bool>,
    /// Whether a firmware update is pending.
    #[serde(default)]
    pub new_version_available: Option<bool>,
}

impl AccountDeviceRecord {
    /// Creates a record from its essential fields.
    #[must_use]
    pub fn new(
        serial: impl Into<String>,
        name: impl Into<String>,
        local_credentials: impl Into<String>,
        product_type: ProductType,
    ) -> Self {
        Self {
            serial: serial.into(),
            name: name.into(),
            local_credentials: local_credentials.into(),
            product_type,
            version: None,
            active: None,
            auto_update: None,
            new_version_available: None,
        }
    }
}

fn product_from_code<'de, D>(deserializer: D) -> Result<ProductType, D::Error>
where
    D: Deserializer<'de>,
{
    let code = String::deserialize(deserializer)?;
    Ok(ProductType::from_code(&code))
}

/// Parses the account service's device manifest.
///
/// # Errors
///
/// Returns `ParseError::Json` if the document is not a list of device records.
pub fn parse_manifest(json: &str) -> Result<Vec<AccountDeviceRecord>, ParseError> {
    Ok(serde_json::from_str(json)?)
}
