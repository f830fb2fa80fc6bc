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


//! HTTP client for the OverDrive endpoints
//!
//! Every request the client makes is a plain GET:
//! - License acquisition: `AcquisitionUrl?MediaID=..&ClientID=..&OMC=..&OS=..&Hash=..`
//! - Part download: `{baseurl}/{filename}` with the `ClientID` and `License` headers
//! - Cover art: the metadata `CoverUrl`
//! - Early return: the descriptor `EarlyReturnURL`
//!
//! All requests carry the vendor `User-Agent`, installed as a default header.
//! There is no retry policy and no overall request timeout; only the connect
//! phase is bounded. A stalled part holds one worker slot until the peer
//! closes the connection.

use crate::api::license::License;
use crate::error::{OdmError, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response};
use std::time::Duration;
use url::Url;

/// User agent the vendor servers expect
pub const DEFAULT_USER_AGENT: &str = "OverDrive Media Console";

/// Default connect timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Configuration for OdmClient
/// Provides a builder pattern for client customization
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// HTTP client shared by the handshake, the part downloader and the
/// return request
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct OdmClient {
    client: Client,
    config: ClientConfig,
}

impl OdmClient {
    /// Create a client with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with a custom configuration
    ///
    /// # Errors
    /// Returns error if the user agent is not a valid header value or the
    /// HTTP client cannot be built
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|e| {
                OdmError::InvalidConfiguration(format!("Invalid user agent: {}", e))
            })?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run the license handshake request and return the raw response body
    ///
    /// Transport failures and non-success statuses are reported as
    /// `LicenseError`; the body is not inspected here.
    pub async fn acquire_license(
        &self,
        acquisition_url: &str,
        query: &[(&str, &str)],
    ) -> Result<String> {
        let url = Url::parse_with_params(acquisition_url, query).map_err(|e| {
            OdmError::license(format!("invalid acquisition url '{}': {}", acquisition_url, e))
        })?;

        tracing::debug!(url = %url, "Requesting license");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OdmError::license(format!("license request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OdmError::license(format!(
                "license server returned {}: {}",
                status,
                body.trim()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| OdmError::license(format!("failed to read license body: {}", e)))
    }

    /// Authenticated GET for one part
    ///
    /// Returns the response only when the status is 200.
    pub async fn download_part(&self, url: &str, license: &License) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .header("ClientID", license.client_id.as_str())
            .header("License", license.header_value())
            .send()
            .await?;

        expect_ok(response)
    }

    /// Plain GET that expects a 200 response
    pub async fn fetch(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        expect_ok(response)
    }

    /// Return the loan early
    ///
    /// A single GET to the early-return URL; any failure is a `ReturnError`
    /// and is never retried.
    pub async fn return_loan(&self, early_return_url: &str) -> Result<()> {
        if early_return_url.trim().is_empty() {
            return Err(OdmError::ReturnError("descriptor has no early return url".to_string()));
        }

        let response = self
            .client
            .get(early_return_url)
            .send()
            .await
            .map_err(|e| OdmError::ReturnError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OdmError::ReturnError(format!(
                "server returned {} for {}",
                status, early_return_url
            )));
        }

        tracing::info!("Loan returned");
        Ok(())
    }
}

fn expect_ok(response: Response) -> Result<Response> {
    if response.status() != reqwest::StatusCode::OK {
        return Err(OdmError::UnexpectedStatusCode {
            status_code: response.status().as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}
