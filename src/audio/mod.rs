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


//! Chapter extraction
//!
//! ## tags
//! Raw tag access through `ffprobe`:
//! - `TagReader` - trait seam used by the extractor
//! - `FfprobeTagReader` - reads the container tags of one file
//! - `FileTags` - custom text frames plus the common descriptive tags
//!
//! ## markers
//! Marker recovery and normalization:
//! - `parse_marker_frame` - decode an `OverDrive MediaMarkers` payload
//! - `normalize_name` / `normalize_time`
//! - `Audiobook` - per-file markers and the merged chapter list
//!
//! ## splitter
//! Directory orchestration and `ffmpeg` invocation:
//! - `ChapterSplitter` - scan, extract, split, describe, archive
//!
//! # FFmpeg Integration
//!
//! Splitting requires `ffmpeg` and `ffprobe` in PATH. Audio is never
//! re-encoded; chapters are cut with `-acodec copy`.

pub mod markers;
pub mod splitter;
pub mod tags;

// Re-export commonly used types for convenience
pub use markers::{normalize_name, normalize_time, Audiobook, Chapter, Marker, RawMarker, Segment};
pub use splitter::{ChapterSplitter, FailedChapter, SplitOptions, SplitSummary};
pub use tags::{FfprobeTagReader, FileTags, StaticTagReader, TagReader};
