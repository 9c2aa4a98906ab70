// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Product family.

use std::fmt;

/// Device family, derived from the account manifest's product code.
///
/// The product code also prefixes every MQTT topic, so the raw code is
/// kept alongside the family.
///
/// # Examples
///
/// ```
/// use purelink::types::ProductType;
///
/// let product = ProductType::from_code("455");
/// assert_eq!(product, ProductType::PureHotCoolLink);
/// assert!(product.supports_heating());
/// assert_eq!(product.code(), "455");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProductType {
    /// Pure Cool Link tower fan (`475`).
    PureCoolLinkTower,
    /// Pure Cool Link desk fan (`469`).
    PureCoolLinkDesk,
    /// Pure Hot+Cool Link (`455`).
    PureHotCoolLink,
    /// 360 Eye robot vacuum (`N223`).
    Eye360,
    /// A product code this library does not know.
    Unknown(String),
}

impl ProductType {
    /// Maps a manifest product code.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "475" => Self::PureCoolLinkTower,
            "469" => Self::PureCoolLinkDesk,
            "455" => Self::PureHotCoolLink,
            "N223" => Self::Eye360,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the manifest product code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::PureCoolLinkTower => "475",
            Self::PureCoolLinkDesk => "469",
            Self::PureHotCoolLink => "455",
            Self::Eye360 => "N223",
            Self::Unknown(code) => code,
        }
    }

    /// Returns true for the fan families.
    #[must_use]
    pub fn is_fan(&self) -> bool {
        matches!(
            self,
            Self::PureCoolLinkTower | Self::PureCoolLinkDesk | Self::PureHotCoolLink
        )
    }

    /// Returns true if the product has a heater.
    #[must_use]
    pub fn supports_heating(&self) -> bool {
        matches!(self, Self::PureHotCoolLink)
    }

    /// Returns true for the robot vacuum.
    #[must_use]
    pub fn is_vacuum(&self) -> bool {
        matches!(self, Self::Eye360)
    }

    /// Human-readable family name used in error messages.
    #[must_use]
    pub const fn family(&self) -> &'static str {
        match self {
            Self::PureCoolLinkTower | Self::PureCoolLinkDesk => "Pure Cool Link",
            Self::PureHotCoolLink => "Pure Hot+Cool Link",
            Self::Eye360 => "360 Eye",
            Self::Unknown(_) => "unknown product",
        }
    }

    /// Topic the device publishes its status on.
    #[must_use]
    pub fn status_topic(&self, serial: &str) -> String {
        if self.is_vacuum() {
            format!("{}/{serial}/status", self.code())
        } else {
            format!("{}/{serial}/status/current", self.code())
        }
    }

    /// Topic the device listens for commands on.
    #[must_use]
    pub fn command_topic(&self, serial: &str) -> String {
        format!("{}/{serial}/command", self.code())
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.family(), self.code())
    }
}
