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


//! Directory scanner for chapter splitting
//!
//! Walks a directory of downloaded parts in lexical order and classifies
//! what it finds: MP3 parts, an optional `.m3u` playlist and any existing
//! description file (`.txt` / `.html`).

use crate::error::{OdmError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Result of scanning one directory tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryListing {
    /// MP3 files in walk order
    pub audio_files: Vec<PathBuf>,
    /// Last `.m3u` playlist found
    pub playlist: Option<PathBuf>,
    /// A non-empty `.txt` or `.html` file exists
    pub has_description: bool,
}

/// Scan `directory` recursively
///
/// Entries of each directory are visited sorted by name, and
/// subdirectories are descended into where they sort.
pub async fn scan_directory(directory: &Path) -> Result<DirectoryListing> {
    if !directory.is_dir() {
        return Err(OdmError::InvalidPath(format!(
            "Path is not a directory: {}",
            directory.display()
        )));
    }

    let mut listing = DirectoryListing::default();
    scan_recursive(directory, &mut listing).await?;
    Ok(listing)
}

/// Recursively scan directory
fn scan_recursive<'a>(
    dir: &'a Path,
    listing: &'a mut DirectoryListing,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await.map_err(|e| {
            OdmError::FileIoError(format!("Failed to read directory {}: {}", dir.display(), e))
        })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            OdmError::FileIoError(format!(
                "Failed to read directory entry in {}: {}",
                dir.display(),
                e
            ))
        })? {
            paths.push(entry.path());
        }
        paths.sort();

        for path in paths {
            let metadata = fs::metadata(&path).await?;
            if metadata.is_dir() {
                scan_recursive(&path, listing).await?;
                continue;
            }

            match extension_of(&path).as_deref() {
                Some("mp3") => listing.audio_files.push(path),
                Some("m3u") => listing.playlist = Some(path),
                Some("txt") | Some("html") if metadata.len() > 0 => {
                    listing.has_description = true
                }
                _ => {}
            }
        }

        Ok(())
    })
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Read the entries of an `.m3u` playlist
///
/// Blank lines, comments and the `#EXTM3U` header are skipped.
pub async fn parse_playlist(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        OdmError::FileIoError(format!("read: {} - {}", path.display(), e))
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.contains("EXTM3U"))
        .map(str::to_string)
        .collect())
}
