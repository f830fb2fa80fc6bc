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


//! Part downloads
//!
//! `manager` runs the worker pool over the part and cover-art jobs and
//! builds the `DownloadReport`. `stream` copies one response body to disk.

pub mod manager;
pub mod stream;

// Re-export commonly used types
pub use manager::{CoverOutcome, DownloadConfig, DownloadReport, FailedJob, PartDownloader};
