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


//! File utilities
//!
//! Directory scanning, output naming and the archive of original parts.

pub mod archive;
pub mod paths;
pub mod scanner;

pub use archive::{archive_and_remove, archive_path};
pub use paths::{chapter_file_name, is_plain_file_name, sanitize_folder_name, unique_name};
pub use scanner::{parse_playlist, scan_directory, DirectoryListing};
