// ODM Core - OverDrive audiobook download client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! License acquisition and caching
//!
//! A loan can be licensed only once: a second handshake for the same
//! descriptor is rejected by the vendor. The first successful response is
//! therefore mirrored to a sidecar file (`<descriptor>.license`) and every
//! later run loads it from there.
//!
//! # Handshake
//! 1. Generate a random client id (UUID v4, upper-cased)
//! 2. Compute `base64(SHA1(UTF-16LE("{ClientID}|{OMC}|{OS}|ELOSNOC*AIDEM*EVIRDREVO")))`
//! 3. GET the acquisition URL with `MediaID`, `ClientID`, `OMC`, `OS` and `Hash`
//! 4. Reject a body carrying a non-empty `ErrorMessage`; otherwise persist it
//!
//! # License Document
//! ```xml
//! <License>
//!   <SignedInfo><ClientID>3C5C4D1A-...</ClientID>...</SignedInfo>
//!   <Signature>...</Signature>
//! </License>
//! ```
//!
//! The signature is not verified. A cached sidecar is trusted as is.
//!
//! The sidecar is not locked. Two processes handling the same descriptor
//! at the same time can both run the handshake; only one will succeed.

use crate::api::client::OdmClient;
use crate::api::descriptor::Descriptor;
use crate::error::{OdmError, Result};
use crate::xml::parse_document;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Client version reported during the handshake
pub const OMC_VERSION: &str = "1.2.0";

/// Operating system version reported during the handshake
pub const OS_VERSION: &str = "10.11.6";

/// Fixed suffix mixed into the handshake hash
const HASH_SECRET: &str = "ELOSNOC*AIDEM*EVIRDREVO";

/// A usage license for one descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    /// Raw license document, exactly as received
    pub raw: String,
    /// Client id the license was issued to
    pub client_id: String,
    /// Loan expiration from the descriptor, when known
    pub expiration: Option<String>,
}

impl License {
    /// Parse a license document
    ///
    /// The client id is read from `SignedInfo/ClientID`. A vendor
    /// `ErrorMessage` is reported as `LicenseError`.
    pub fn parse(raw: String) -> Result<Self> {
        let root = parse_document(&raw)
            .map_err(|e| OdmError::license(format!("unreadable license: {}", e)))?;

        let error_message = root.text_at(&["ErrorMessage"]);
        if !error_message.is_empty() {
            return Err(OdmError::license(error_message));
        }

        Ok(Self {
            client_id: root.text_at(&["SignedInfo", "ClientID"]),
            raw,
            expiration: None,
        })
    }

    /// Value sent in the `License` request header
    ///
    /// Line breaks are not allowed in header values and are sent as spaces.
    pub fn header_value(&self) -> String {
        self.raw.trim().replace(['\r', '\n'], " ")
    }
}

/// Handshake hash for a client id
pub fn compute_hash(client_id: &str) -> String {
    let input = format!("{}|{}|{}|{}", client_id, OMC_VERSION, OS_VERSION, HASH_SECRET);
    let utf16le: Vec<u8> = input
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();

    BASE64.encode(Sha1::digest(&utf16le))
}

/// Fresh upper-case client id
pub fn generate_client_id() -> String {
    uuid::Uuid::new_v4().to_string().to_uppercase()
}

/// Load-or-fetch-then-persist cache for one descriptor's license
///
/// The license is acquired at most once per cache: the first caller runs
/// the lookup while holding the lock, later callers get the cached copy.
#[derive(Debug)]
pub struct LicenseCache {
    media_id: String,
    acquisition_url: String,
    expiration: Option<String>,
    sidecar: PathBuf,
    cached: Mutex<Option<License>>,
}

impl LicenseCache {
    /// Cache for the given descriptor, mirrored to `<descriptor>.license`
    pub fn for_descriptor(descriptor: &Descriptor) -> Self {
        Self {
            media_id: descriptor.id.clone(),
            acquisition_url: descriptor.acquisition_url.clone(),
            expiration: descriptor.expiration_date.clone(),
            sidecar: descriptor.license_path(),
            cached: Mutex::new(None),
        }
    }

    /// Path of the sidecar file
    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar
    }

    /// Return the license, acquiring it on first use
    ///
    /// Order: in-memory copy, then the sidecar file, then the network
    /// handshake. A handshake result is written to the sidecar before it is
    /// cached.
    pub async fn get_license(&self, client: &OdmClient) -> Result<License> {
        let mut cached = self.cached.lock().await;
        if let Some(license) = cached.as_ref() {
            return Ok(license.clone());
        }

        let license = match self.load_sidecar().await? {
            Some(license) => {
                tracing::info!(path = %self.sidecar.display(), "Using cached license");
                license
            }
            None => self.handshake(client).await?,
        };

        *cached = Some(license.clone());
        Ok(license)
    }

    async fn load_sidecar(&self) -> Result<Option<License>> {
        let raw = match tokio::fs::read_to_string(&self.sidecar).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OdmError::FileIoError(format!(
                    "read: {} - {}",
                    self.sidecar.display(),
                    e
                )))
            }
        };

        let mut license = License::parse(raw)?;
        license.expiration = self.expiration.clone();
        Ok(Some(license))
    }

    async fn handshake(&self, client: &OdmClient) -> Result<License> {
        let client_id = generate_client_id();
        let hash = compute_hash(&client_id);

        tracing::info!(media_id = %self.media_id, "Acquiring license");

        let query = [
            ("MediaID", self.media_id.as_str()),
            ("ClientID", client_id.as_str()),
            ("OMC", OMC_VERSION),
            ("OS", OS_VERSION),
            ("Hash", hash.as_str()),
        ];
        let raw = client.acquire_license(&self.acquisition_url, &query).await?;

        let mut license = License::parse(raw)?;
        if license.client_id.is_empty() {
            license.client_id = client_id;
        }
        license.expiration = self.expiration.clone();

        tokio::fs::write(&self.sidecar, license.raw.as_bytes())
            .await
            .map_err(|e| {
                OdmError::FileIoError(format!("write: {} - {}", self.sidecar.display(), e))
            })?;

        Ok(license)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_reference_vectors() {
        assert_eq!(
            compute_hash("00000000-0000-0000-0000-000000000000"),
            "kqvGot6fqVG2ycxmYeaJYKXrMPE="
        );
        assert_eq!(
            compute_hash("3C5C4D1A-7B0E-4F0A-9A4B-2C1D5E6F7A8B"),
            "BvFhsj4nIW2lw7rOultLl0MPtxk="
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        let id = generate_client_id();
        assert_eq!(compute_hash(&id), compute_hash(&id));
    }

    #[test]
    fn test_client_id_is_upper_case_uuid() {
        let id = generate_client_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_uppercase());
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_parse_license() {
        let raw = "<License>\n<SignedInfo><ClientID>ABC-123</ClientID></SignedInfo>\n<Signature>x</Signature></License>\n";
        let license = License::parse(raw.to_string()).unwrap();
        assert_eq!(license.client_id, "ABC-123");
        assert_eq!(license.raw, raw);
        assert!(!license.header_value().contains('\n'));
        assert!(license.header_value().starts_with("<License>"));
    }

    #[test]
    fn test_vendor_error_message() {
        let raw = "<License><ErrorMessage>This title has already been downloaded</ErrorMessage></License>";
        let err = License::parse(raw.to_string()).unwrap_err();
        match err {
            OdmError::LicenseError(message) => assert!(message.contains("already been downloaded")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_license() {
        let err = License::parse("<html><body>oops".to_string()).unwrap_err();
        assert!(matches!(err, OdmError::LicenseError(_)));
    }
}
