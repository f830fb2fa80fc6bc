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


//! Chapter splitting
//!
//! Orchestrates one directory of downloaded parts:
//! 1. Scan the directory and read the tags of every MP3
//! 2. Collect the marker frames into an [`Audiobook`]
//! 3. Fall back to the `.m3u` playlist when no part has markers
//! 4. Write `about.html` from the tags when no description exists
//! 5. Cut one file per chapter with `ffmpeg`
//! 6. Optionally archive the original parts
//!
//! A chapter inside one part is cut with `-ss`/`-to`. A chapter continued
//! over several parts is joined with the concat demuxer, using `inpoint` and
//! `outpoint` per part. Audio is always stream-copied.

use crate::audio::markers::{parse_marker_frame, Audiobook, Chapter, Segment};
use crate::audio::tags::TagReader;
use crate::error::{OdmError, Result};
use crate::file::archive::{archive_and_remove, archive_path};
use crate::file::paths::{chapter_file_name, index_width, is_plain_file_name};
use crate::file::scanner::{parse_playlist, scan_directory};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

/// Name of the generated description file
pub const DESCRIPTION_FILE: &str = "about.html";

/// Options for one split run
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Directory holding the downloaded parts
    pub directory: PathBuf,
    /// Output directory; defaults to `directory`
    pub outdir: Option<PathBuf>,
    /// Zip and delete the source parts after every chapter was written
    pub delete_sources: bool,
}

impl SplitOptions {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            outdir: None,
            delete_sources: false,
        }
    }

    fn output_dir(&self) -> &Path {
        self.outdir.as_deref().unwrap_or(&self.directory)
    }
}

/// A chapter that could not be written
#[derive(Debug, Clone, Serialize)]
pub struct FailedChapter {
    pub file_name: String,
    pub message: String,
}

/// Outcome of a split run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitSummary {
    /// Files written, in chapter order
    pub written: Vec<PathBuf>,
    pub failed: Vec<FailedChapter>,
    /// Playlist entries renamed when no markers were found
    pub renamed: Vec<PathBuf>,
    pub description_written: bool,
    pub archive: Option<PathBuf>,
}

impl SplitSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Descriptive tags gathered for `about.html`
#[derive(Debug, Default)]
struct Description {
    author: Option<String>,
    categories: Option<String>,
    summary: Option<String>,
}

impl Description {
    fn render(&self) -> Option<String> {
        let summary = self.summary.as_deref()?;
        Some(format!(
            "{}<br><br>\n{}\n<br>\n{}",
            summary,
            self.author.as_deref().unwrap_or_default(),
            self.categories.as_deref().unwrap_or_default()
        ))
    }
}

/// Splits downloaded parts into chapter files
pub struct ChapterSplitter<R> {
    reader: R,
    ffmpeg: PathBuf,
}

impl<R: TagReader> ChapterSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    /// Use a specific ffmpeg binary
    pub fn with_ffmpeg<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.ffmpeg = program.into();
        self
    }

    /// Read the markers of every part in `directory`
    pub async fn read_audiobook(&self, directory: &Path) -> Result<Audiobook> {
        let listing = scan_directory(directory).await?;
        let (book, _, _) = self.collect(&listing.audio_files).await?;
        Ok(book)
    }

    async fn collect(&self, files: &[PathBuf]) -> Result<(Audiobook, Vec<PathBuf>, Description)> {
        let mut book = Audiobook::new();
        let mut sources = Vec::new();
        let mut description = Description::default();

        for path in files {
            let tags = self.reader.read_tags(path).await?;

            let mut markers = None;
            for frame in &tags.text_frames {
                if let Some(found) = parse_marker_frame(frame)? {
                    markers = Some(found);
                    break;
                }
            }
            let markers = match markers {
                Some(markers) => markers,
                None => {
                    tracing::debug!(file = %path.display(), "No marker frame");
                    book.add_file(path, Vec::new());
                    continue;
                }
            };

            if description.author.is_none() {
                description.author = tags.artist.clone();
            }
            if description.categories.is_none() {
                description.categories = tags.genre.clone();
            }
            if description.summary.is_none() {
                description.summary = tags.comment.clone();
            }

            let kept = book.add_file(path, markers);
            tracing::debug!(file = %path.display(), markers = kept, "Read markers");
            sources.push(path.clone());
        }

        Ok((book, sources, description))
    }

    /// Run the whole split for one directory
    ///
    /// Per-chapter `ffmpeg` failures are collected in the summary. The
    /// source parts are only archived when every chapter was written.
    pub async fn run(&self, options: &SplitOptions) -> Result<SplitSummary> {
        let outdir = options.output_dir();
        fs::create_dir_all(outdir).await.map_err(|e| {
            OdmError::FileIoError(format!("create: {} - {}", outdir.display(), e))
        })?;

        let listing = scan_directory(&options.directory).await?;
        let (book, sources, description) = self.collect(&listing.audio_files).await?;
        let mut summary = SplitSummary::default();

        if book.is_empty() {
            if let Some(playlist) = &listing.playlist {
                tracing::info!("Detected playlist file with no markers");
                summary.renamed = rename_playlist(playlist, &options.directory, outdir).await?;
                return Ok(summary);
            }
            tracing::warn!(directory = %options.directory.display(), "No chapter markers found");
            return Ok(summary);
        }

        if !listing.has_description {
            if let Some(html) = description.render() {
                let path = outdir.join(DESCRIPTION_FILE);
                fs::write(&path, html).await.map_err(|e| {
                    OdmError::FileIoError(format!("write: {} - {}", path.display(), e))
                })?;
                tracing::info!(path = %path.display(), "Saved description");
                summary.description_written = true;
            }
        }

        let file_names = book.output_file_names();
        for (i, (chapter, file_name)) in book.chapters().iter().zip(file_names).enumerate() {
            let destination = outdir.join(&file_name);
            match self.split_chapter(chapter, &destination).await {
                Ok(()) => {
                    tracing::info!("Saved {} - {}", i, chapter.name);
                    summary.written.push(destination);
                }
                Err(e) => {
                    tracing::error!(chapter = %chapter.name, "Could not split file: {}", e);
                    summary.failed.push(FailedChapter {
                        file_name,
                        message: e.to_string(),
                    });
                }
            }
        }

        if options.delete_sources {
            if summary.is_success() {
                let archive = archive_path(&options.directory, outdir)?;
                summary.archive = Some(archive_and_remove(sources, archive).await?);
            } else {
                tracing::warn!("Keeping original parts because some chapters failed");
            }
        }

        Ok(summary)
    }

    /// Write one chapter to `destination`
    pub async fn split_chapter(&self, chapter: &Chapter, destination: &Path) -> Result<()> {
        match chapter.segments.as_slice() {
            [] => Err(OdmError::internal(format!("chapter '{}' has no segments", chapter.name))),
            [segment] => execute_ffmpeg(&self.ffmpeg, &split_args(segment, destination)).await,
            segments => {
                let mut absolute = Vec::with_capacity(segments.len());
                for segment in segments {
                    let source = fs::canonicalize(&segment.source).await.map_err(|e| {
                        OdmError::FileIoError(format!("{} - {}", segment.source.display(), e))
                    })?;
                    absolute.push(Segment {
                        source,
                        ..segment.clone()
                    });
                }

                let list = concat_list_path(destination);
                fs::write(&list, concat_list(&absolute)).await.map_err(|e| {
                    OdmError::FileIoError(format!("write: {} - {}", list.display(), e))
                })?;

                let result = execute_ffmpeg(&self.ffmpeg, &concat_args(&list, destination)).await;
                if let Err(e) = fs::remove_file(&list).await {
                    tracing::warn!(path = %list.display(), "Could not remove concat list: {}", e);
                }
                result
            }
        }
    }
}

/// `ffmpeg` arguments for a chapter inside one source
pub fn split_args(segment: &Segment, destination: &Path) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        segment.source.to_string_lossy().to_string(),
        "-acodec".to_string(),
        "copy".to_string(),
        "-ss".to_string(),
        segment.start.clone(),
    ];
    if let Some(end) = &segment.end {
        args.push("-to".to_string());
        args.push(end.clone());
    }
    args.push(destination.to_string_lossy().to_string());
    args
}

/// `ffmpeg` arguments for a chapter joined from a concat list
pub fn concat_args(list: &Path, destination: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list.to_string_lossy().to_string(),
        "-acodec".to_string(),
        "copy".to_string(),
        destination.to_string_lossy().to_string(),
    ]
}

/// Concat demuxer script for the segments of one chapter
pub fn concat_list(segments: &[Segment]) -> String {
    let mut script = String::from("ffconcat version 1.0\n");
    for segment in segments {
        let path = segment.source.to_string_lossy().replace('\'', r"'\''");
        script.push_str(&format!("file '{}'\n", path));
        script.push_str(&format!("inpoint {}\n", segment.start));
        if let Some(end) = &segment.end {
            script.push_str(&format!("outpoint {}\n", end));
        }
    }
    script
}

fn concat_list_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".concat.txt");
    PathBuf::from(name)
}

/// Rename the playlist entries to numbered files in `outdir`
async fn rename_playlist(playlist: &Path, directory: &Path, outdir: &Path) -> Result<Vec<PathBuf>> {
    let entries: Vec<String> = parse_playlist(playlist)
        .await?
        .into_iter()
        .filter(|entry| {
            let plain = is_plain_file_name(entry);
            if !plain {
                tracing::warn!(entry = %entry, "Skipping playlist entry outside the directory");
            }
            plain
        })
        .collect();
    let width = index_width(entries.len());
    let mut renamed = Vec::with_capacity(entries.len());

    for (i, entry) in entries.iter().enumerate() {
        let stem = Path::new(entry)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.clone());
        let destination = outdir.join(chapter_file_name(i, width, &stem));

        match fs::rename(directory.join(entry), &destination).await {
            Ok(()) => {
                tracing::info!("Renamed {}", entry);
                renamed.push(destination);
            }
            Err(e) => tracing::warn!(entry = %entry, "Could not rename playlist entry: {}", e),
        }
    }

    Ok(renamed)
}

/// Execute FFmpeg command and handle errors
async fn execute_ffmpeg(program: &Path, args: &[String]) -> Result<()> {
    tracing::debug!("{} {}", program.display(), args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OdmError::FfmpegNotFound
            } else {
                OdmError::FfmpegError(format!("Failed to execute ffmpeg: {}", e))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OdmError::FfmpegError(format!("FFmpeg failed: {}", stderr.trim())));
    }

    Ok(())
}
