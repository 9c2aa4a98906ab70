// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local credential decryption.
//!
//! The account service hands out each device's local MQTT password wrapped in
//! AES-256-CBC under a fixed key that ships with every client. Decryption is
//! deterministic, so the result is resolved once and cached on the device.

use std::fmt;

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};

use crate::account::AccountDeviceRecord;
use crate::error::CredentialError;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;

const KEY: [u8; 32] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f, 0x20,
];

const IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

const PASSWORD_FIELD: &str = "apPasswordHash";

/// Serial and decrypted password for one device.
///
/// `Debug` output never includes the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    serial: String,
    local_password: String,
}

impl ResolvedCredential {
    /// Creates a credential from an already known password.
    #[must_use]
    pub fn new(serial: impl Into<String>, local_password: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            local_password: local_password.into(),
        }
    }

    /// Decrypts the credential carried by an account record.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError` if the blob is malformed.
    pub fn resolve(record: &AccountDeviceRecord) -> Result<Self, CredentialError> {
        let local_password = decrypt_password(&record.local_credentials)?;
        tracing::debug!(serial = %record.serial, "Resolved local credential");
        Ok(Self::new(record.serial.clone(), local_password))
    }

    /// Returns the serial (MQTT username).
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Returns the decrypted password (MQTT password).
    #[must_use]
    pub fn local_password(&self) -> &str {
        &self.local_password
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("serial", &self.serial)
            .field("local_password", &"<redacted>")
            .finish()
    }
}

impl TryFrom<&AccountDeviceRecord> for ResolvedCredential {
    type Error = CredentialError;

    fn try_from(record: &AccountDeviceRecord) -> Result<Self, Self::Error> {
        Self::resolve(record)
    }
}

/// Decrypts a `LocalCredentials` blob and returns the device password.
///
/// # Errors
///
/// Returns `CredentialError` if the blob is not base64, is not a whole number
/// of cipher blocks, has a bad padding trailer, or does not hold the expected
/// JSON document.
pub fn decrypt_password(encrypted: &str) -> Result<String, CredentialError> {
    let mut buffer = STANDARD.decode(encrypted.trim())?;
    if buffer.is_empty() || buffer.len() % BLOCK_SIZE != 0 {
        return Err(CredentialError::CipherLength(buffer.len()));
    }

    let plain = Aes256CbcDec::new(&KEY.into(), &IV.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| CredentialError::Padding)?;

    let plain = strip_padding(plain)?;
    let document: serde_json::Value = serde_json::from_slice(plain)?;

    document
        .get(PASSWORD_FIELD)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or(CredentialError::MissingField(PASSWORD_FIELD))
}

/// Removes the trailer whose length is given by the final byte.
fn strip_padding(plain: &[u8]) -> Result<&[u8], CredentialError> {
    let Some(&last) = plain.last() else {
        return Err(CredentialError::Padding);
    };
    let pad = usize::from(last);
    if pad == 0 || pad > BLOCK_SIZE || pad > plain.len() {
        return Err(CredentialError::Padding);
    }
    Ok(&plain[..plain.len() - pad])
}
