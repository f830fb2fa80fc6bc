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


//! Response body to file
//!
//! Parts are written from scratch: an existing file of the wrong size is
//! truncated and downloaded again. A file whose size equals the declared
//! part size counts as complete and is never requested.

use crate::error::{OdmError, Result};
use futures_util::StreamExt;
use reqwest::Response;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;

/// Whether `path` already holds exactly `expected_size` bytes
pub async fn is_complete(path: &Path, expected_size: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() == expected_size,
        Err(_) => false,
    }
}

/// Whether `path` exists and is not empty
pub async fn is_non_empty(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(_) => false,
    }
}

/// Stream the response body into `destination`, replacing its content
///
/// Returns the number of bytes written. A body cut short leaves the partial
/// file in place.
pub async fn write_body(response: Response, destination: &Path) -> Result<u64> {
    let file = File::create(destination).await.map_err(|e| {
        OdmError::FileIoError(format!("create: {} - {}", destination.display(), e))
    })?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_is_complete() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Part01.mp3");

        assert!(!is_complete(&path, 0).await);
        std::fs::write(&path, b"12345").unwrap();
        assert!(is_complete(&path, 5).await);
        assert!(!is_complete(&path, 6).await);
        assert!(!is_complete(temp_dir.path(), 0).await);
    }

    #[tokio::test]
    async fn test_is_non_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("folder.jpg");

        assert!(!is_non_empty(&path).await);
        std::fs::write(&path, b"").unwrap();
        assert!(!is_non_empty(&path).await);
        std::fs::write(&path, b"jpg").unwrap();
        assert!(is_non_empty(&path).await);
    }
}
