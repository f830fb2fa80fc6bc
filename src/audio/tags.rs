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


//! Tag access for downloaded parts
//!
//! The extractor only needs the custom text frames of each part plus three
//! descriptive tags. They are read through `ffprobe -show_format`, which
//! exposes an ID3 `TXXX` frame as a tag keyed by the frame description, so
//! the marker frame comes back as `"OverDrive MediaMarkers" => "<Markers>..."`.
//! The reader rebuilds the `"{label}:{value}"` form the vendor writes.

use crate::error::{OdmError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Tags read from one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTags {
    /// Text frames as `"{label}:{value}"`
    pub text_frames: Vec<String>,
    /// `TPE1`
    pub artist: Option<String>,
    /// `TCON`
    pub genre: Option<String>,
    /// `COMM` text
    pub comment: Option<String>,
}

/// Source of raw tag values
pub trait TagReader: Send + Sync {
    fn read_tags(&self, path: &Path) -> impl Future<Output = Result<FileTags>> + Send;
}

#[derive(Debug, Deserialize)]
struct FormatProbe {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Reads tags with `ffprobe`
#[derive(Debug, Clone)]
pub struct FfprobeTagReader {
    program: PathBuf,
}

impl Default for FfprobeTagReader {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeTagReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific ffprobe binary
    pub fn with_program<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TagReader for FfprobeTagReader {
    async fn read_tags(&self, path: &Path) -> Result<FileTags> {
        let output = Command::new(&self.program)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg(path.as_os_str())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OdmError::FfmpegNotFound
                } else {
                    OdmError::FfmpegError(format!("Failed to execute ffprobe: {}", e))
                }
            })?;

        if !output.status.success() {
            return Err(OdmError::FfmpegError(format!(
                "FFprobe failed for {}",
                path.display()
            )));
        }

        let probe: FormatProbe = serde_json::from_slice(&output.stdout)?;
        Ok(tags_from_probe(probe.format.tags))
    }
}

fn tags_from_probe(tags: HashMap<String, String>) -> FileTags {
    // Stable frame order regardless of hash order
    let tags: BTreeMap<String, String> = tags.into_iter().collect();

    let lookup = |key: &str| {
        tags.iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
    };

    FileTags {
        artist: lookup("artist"),
        genre: lookup("genre"),
        comment: lookup("comment"),
        text_frames: tags
            .iter()
            .map(|(label, value)| format!("{}:{}", label, value))
            .collect(),
    }
}

/// Tag reader over a fixed map, keyed by file name
#[derive(Debug, Clone, Default)]
pub struct StaticTagReader {
    tags: HashMap<String, FileTags>,
}

impl StaticTagReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, file_name: S, tags: FileTags) {
        self.tags.insert(file_name.into(), tags);
    }
}

impl TagReader for StaticTagReader {
    async fn read_tags(&self, path: &Path) -> Result<FileTags> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.tags.get(&name).cloned().unwrap_or_default())
    }
}
