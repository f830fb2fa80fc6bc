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


//! Runtime settings
//!
//! Settings come from three layers, later layers winning:
//! 1. Built-in defaults
//! 2. An optional JSON file
//! 3. `ODM_*` environment variables
//!
//! | Variable | Setting |
//! |---|---|
//! | `ODM_USER_AGENT` | `user_agent` |
//! | `ODM_CONNECT_TIMEOUT` | `connect_timeout_secs` |
//! | `ODM_OUTDIR` | `download.output_directory` |
//! | `ODM_WORKERS` | `download.workers` |
//! | `ODM_VERBOSE` | `download.verbose` |
//! | `ODM_LOG_FILE` | `log_file` |

use crate::api::client::{ClientConfig, DEFAULT_USER_AGENT};
use crate::download::manager::DownloadConfig;
use crate::error::{OdmError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment overrides
pub const ENV_PREFIX: &str = "ODM_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub download: DownloadConfig,
    /// Append job events to this file
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_secs: 30,
            download: DownloadConfig::default(),
            log_file: None,
        }
    }
}

impl Settings {
    /// Defaults, then `path` when given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OdmError::InvalidConfiguration(format!("read: {} - {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            OdmError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })
    }

    /// Apply overrides; `lookup` receives the key without the prefix
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user_agent) = lookup("USER_AGENT") {
            self.user_agent = user_agent;
        }
        if let Some(timeout) = lookup("CONNECT_TIMEOUT") {
            self.connect_timeout_secs = parse_number("CONNECT_TIMEOUT", &timeout)?;
        }
        if let Some(outdir) = lookup("OUTDIR") {
            self.download.output_directory = PathBuf::from(outdir);
        }
        if let Some(workers) = lookup("WORKERS") {
            self.download.workers = parse_number("WORKERS", &workers)?;
        }
        if let Some(verbose) = lookup("VERBOSE") {
            self.download.verbose = matches!(
                verbose.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(log_file) = lookup("LOG_FILE") {
            self.log_file = Some(PathBuf::from(log_file));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.download.workers == 0 {
            return Err(OdmError::InvalidConfiguration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(OdmError::InvalidConfiguration(
                "user agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .build()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        OdmError::InvalidConfiguration(format!("{}{}: '{}' is not a number", ENV_PREFIX, key, value))
    })
}
