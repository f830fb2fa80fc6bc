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


//! OverDrive API surface
//!
//! Descriptor parsing, the license handshake, format selection and the
//! HTTP client that talks to the vendor endpoints.

pub mod client;
pub mod descriptor;
pub mod format;
pub mod license;

// Re-export commonly used types
pub use client::{ClientConfig, OdmClient};
pub use descriptor::{Creator, Descriptor, Format, Metadata, Part, Protocol, Quality};
pub use format::{choose_best_format, download_url};
pub use license::{compute_hash, License, LicenseCache};
