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


//! OverDrive audiobook client
//!
//! Reads an `.odm` loan descriptor, acquires the usage license, downloads
//! the MP3 parts with a worker pool and splits finished parts into chapter
//! files.
//!
//! ```rust,no_run
//! use odm_core::api::{Descriptor, LicenseCache, OdmClient};
//! use odm_core::download::{DownloadConfig, PartDownloader};
//! use std::path::Path;
//!
//! # async fn example() -> odm_core::error::Result<()> {
//! let descriptor = Descriptor::from_file(Path::new("book.odm")).await?;
//! let licenses = LicenseCache::for_descriptor(&descriptor);
//! let downloader = PartDownloader::new(OdmClient::new()?, DownloadConfig::default());
//!
//! let report = downloader.download(&descriptor, &licenses).await?;
//! println!("{} parts failed", report.failed.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod job_log;
pub mod logging;
pub mod xml;

pub use error::{OdmError, Result};
