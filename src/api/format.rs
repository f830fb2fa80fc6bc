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


//! Format selection

use crate::api::descriptor::Format;
use crate::error::{OdmError, Result};

/// Pick the format to download
///
/// A single format is returned whatever its quality. Otherwise the highest
/// ranked quality wins and ties keep the earlier format.
pub fn choose_best_format(formats: &[Format]) -> Result<&Format> {
    if let [only] = formats {
        return Ok(only);
    }

    formats
        .iter()
        .fold(None, |best: Option<&Format>, format| match best {
            Some(b) if format.quality.rank() <= b.quality.rank() => Some(b),
            _ => Some(format),
        })
        .ok_or(OdmError::NoDownloadUrl)
}

/// Base URL of the first protocol whose method is `download`
pub fn download_url(format: &Format) -> Result<&str> {
    format
        .protocols
        .iter()
        .find(|p| p.method.eq_ignore_ascii_case("download"))
        .map(|p| p.base_url.as_str())
        .ok_or(OdmError::NoDownloadUrl)
}

/// Full URL of a part
pub fn part_url(base_url: &str, file_name: &str) -> String {
    format!("{}/{}", base_url, file_name)
}
