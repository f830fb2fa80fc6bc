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


//! Chapter markers embedded in downloaded parts
//!
//! Each MP3 part carries a custom text frame whose label contains
//! `OverDrive MediaMarkers` and whose value is a small XML document:
//!
//! ```xml
//! <Markers>
//!   <Marker><Name>Chapter 1 (00:05:30)</Name><Time>0:00.000</Time></Marker>
//!   <Marker><Name>Chapter 2</Name><Time>65:12.500</Time></Marker>
//! </Markers>
//! ```
//!
//! Times are relative to the part and may carry more than 60 minutes. They
//! are normalized to `HH:MM:SS.mmm` for `ffmpeg`. Names lose any trailing
//! `(mm:ss)` timestamp and the characters that do not survive in a file
//! name.
//!
//! A chapter that runs past the end of a part reappears as the first marker
//! of the next part under the same name. [`Audiobook`] folds such
//! continuations into one chapter with several segments. Marker end times
//! never cross a part boundary: the last marker of a part runs to the end
//! of that part.

use crate::error::{OdmError, Result};
use crate::file::paths::{chapter_file_name, index_width, unique_name};
use crate::xml::parse_document;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Substring identifying the marker frame label
pub const MARKER_LABEL: &str = "OverDrive MediaMarkers";

lazy_static! {
    static ref TIMESTAMP_SUFFIX: Regex =
        Regex::new(r"(\s+\(([0-9]+:)+[0-9]+\))$").expect("valid timestamp pattern");
}

/// Marker as stored in the frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMarker {
    pub name: String,
    pub time: String,
}

/// Normalized marker of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub name: String,
    /// Start time, `HH:MM:SS.mmm`
    pub time: String,
    /// Start of the next marker in the same file
    pub end_time: Option<String>,
    pub source: PathBuf,
}

/// Part of a chapter inside one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub source: PathBuf,
    pub start: String,
    /// `None` runs to the end of the source
    pub end: Option<String>,
}

/// One output chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    /// Unique output name
    pub name: String,
    /// Name as found in the markers, before collision renaming
    pub marker_name: String,
    pub segments: Vec<Segment>,
}

/// Decode a text frame
///
/// Returns `Ok(None)` when the frame is not a marker frame. A marker frame
/// whose payload is not valid XML is an error.
pub fn parse_marker_frame(frame: &str) -> Result<Option<Vec<RawMarker>>> {
    let (label, payload) = match frame.split_once(':') {
        Some(parts) => parts,
        None => return Ok(None),
    };
    if !label.contains(MARKER_LABEL) {
        return Ok(None);
    }

    let root = parse_document(payload)?;
    let markers = root
        .children_named("Marker")
        .map(|m| RawMarker {
            name: m.text_at(&["Name"]),
            time: m.text_at(&["Time"]),
        })
        .collect();

    Ok(Some(markers))
}

/// Clean a chapter name for use in a file name
///
/// ```
/// use odm_core::audio::normalize_name;
/// assert_eq!(normalize_name(" Chapter 1 (00:05:30) "), "Chapter 1");
/// assert_eq!(normalize_name("Q&A: Why?"), "Q&A: Why");
/// ```
pub fn normalize_name(name: &str) -> String {
    let name = TIMESTAMP_SUFFIX.replace(name.trim(), "");
    name.trim()
        .chars()
        .filter(|c| !matches!(c, '.' | '"' | '\'' | '?'))
        .map(|c| if matches!(c, '/' | '|') { '-' } else { c })
        .collect()
}

/// Parse a marker time into milliseconds
///
/// Accepts `S`, `M:S` and `H:M:S`, where seconds may be fractional and
/// minutes may exceed 59.
pub fn parse_time_ms(time: &str) -> Result<u64> {
    let time = time.trim();
    if time.is_empty() {
        return Err(OdmError::time_parse(time, "empty time"));
    }

    let components: Vec<&str> = time.split(':').collect();
    if components.len() > 3 {
        return Err(OdmError::time_parse(time, "too many components"));
    }

    let (seconds, whole) = match components.split_last() {
        Some(split) => split,
        None => return Err(OdmError::time_parse(time, "empty time")),
    };

    let seconds: f64 = seconds
        .trim()
        .parse()
        .map_err(|_| OdmError::time_parse(time, format!("invalid seconds '{}'", seconds)))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(OdmError::time_parse(time, "seconds out of range"));
    }

    let mut whole_ms: u64 = 0;
    // whole = [minutes] or [hours, minutes]
    for (component, unit_ms) in whole.iter().rev().zip([60_000u64, 3_600_000]) {
        let value: i64 = component
            .trim()
            .parse()
            .map_err(|_| OdmError::time_parse(time, format!("invalid component '{}'", component)))?;
        if value < 0 {
            return Err(OdmError::time_parse(time, "negative component"));
        }
        whole_ms = (value as u64)
            .checked_mul(unit_ms)
            .and_then(|ms| ms.checked_add(whole_ms))
            .ok_or_else(|| OdmError::time_parse(time, "out of range"))?;
    }

    let seconds_ms = (seconds * 1000.0).round();
    if seconds_ms >= u64::MAX as f64 {
        return Err(OdmError::time_parse(time, "out of range"));
    }
    whole_ms
        .checked_add(seconds_ms as u64)
        .ok_or_else(|| OdmError::time_parse(time, "out of range"))
}

/// Render milliseconds as `HH:MM:SS.mmm`
pub fn format_time_ms(ms: u64) -> String {
    let total_seconds = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
        ms % 1000
    )
}

/// Normalize a marker time to `HH:MM:SS.mmm`
///
/// Seconds past 59 carry into minutes and minutes past 59 carry into hours.
pub fn normalize_time(time: &str) -> Result<String> {
    parse_time_ms(time).map(format_time_ms)
}

/// Markers of a whole book and the chapter list derived from them
#[derive(Debug, Clone, Default, Serialize)]
pub struct Audiobook {
    files: Vec<(PathBuf, Vec<Marker>)>,
    chapters: Vec<Chapter>,
    #[serde(skip)]
    taken: HashSet<String>,
}

impl Audiobook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the markers of the next source file, in book order
    ///
    /// Markers with a time that cannot be normalized are skipped. Returns
    /// the number of markers kept. A file without markers must still be
    /// added so that chapters do not continue across it.
    pub fn add_file(&mut self, source: &Path, raw: Vec<RawMarker>) -> usize {
        let mut markers: Vec<Marker> = Vec::with_capacity(raw.len());

        for marker in raw {
            match normalize_time(&marker.time) {
                Ok(time) => markers.push(Marker {
                    name: normalize_name(&marker.name),
                    time,
                    end_time: None,
                    source: source.to_path_buf(),
                }),
                Err(e) => {
                    tracing::warn!(file = %source.display(), marker = %marker.name, "Skipping marker: {}", e);
                }
            }
        }

        for i in 1..markers.len() {
            markers[i - 1].end_time = Some(markers[i].time.clone());
        }

        for (i, marker) in markers.iter().enumerate() {
            let segment = Segment {
                source: marker.source.clone(),
                start: marker.time.clone(),
                end: marker.end_time.clone(),
            };

            if i == 0 {
                let previous_file = self.files.last().map(|(path, _)| path.as_path());
                if let Some(previous) = self.chapters.last_mut() {
                    let continues = previous
                        .segments
                        .last()
                        .map(|s| Some(s.source.as_path()) == previous_file)
                        .unwrap_or(false);
                    if continues && previous.marker_name == marker.name {
                        previous.segments.push(segment);
                        continue;
                    }
                }
            }

            let name = unique_name(&marker.name, &self.taken);
            self.taken.insert(name.clone());
            self.chapters.push(Chapter {
                name,
                marker_name: marker.name.clone(),
                segments: vec![segment],
            });
        }

        let kept = markers.len();
        self.files.push((source.to_path_buf(), markers));
        kept
    }

    /// Markers of one source file
    pub fn markers(&self, source: &Path) -> Option<&[Marker]> {
        self.files
            .iter()
            .find(|(path, _)| path == source)
            .map(|(_, markers)| markers.as_slice())
    }

    /// Source files in the order they were added
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|(path, _)| path.as_path())
    }

    /// Ordered chapter list
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn marker_count(&self) -> usize {
        self.files.iter().map(|(_, markers)| markers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Output file names, index-aligned with `chapters()`
    pub fn output_file_names(&self) -> Vec<String> {
        let width = index_width(self.chapters.len());
        self.chapters
            .iter()
            .enumerate()
            .map(|(i, chapter)| chapter_file_name(i, width, &chapter.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, time: &str) -> RawMarker {
        RawMarker {
            name: name.to_string(),
            time: time.to_string(),
        }
    }

    #[test]
    fn test_normalize_time() {
        assert_eq!(normalize_time("0:61:05").unwrap(), "01:01:05.000");
        assert_eq!(normalize_time("59.999").unwrap(), "00:00:59.999");
        assert_eq!(normalize_time("65:12.5").unwrap(), "01:05:12.500");
        assert_eq!(normalize_time("1:59:75").unwrap(), "02:00:15.000");
        assert_eq!(normalize_time("00:00.000").unwrap(), "00:00:00.000");
    }

    #[test]
    fn test_normalize_time_errors() {
        for bad in [
            "",
            "  ",
            "abc",
            "1:x:3",
            "1:2:3:4",
            "-5",
            "1:-2:00",
            "1::2",
            "9999999999999999:00:00",
            "1:1e300",
            "18446744073709551615:00",
        ] {
            let err = normalize_time(bad).unwrap_err();
            assert!(matches!(err, OdmError::TimeParseError { .. }), "{:?} -> {:?}", bad, err);
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name(" Chapter 1 (00:05:30) "), "Chapter 1");
        assert_eq!(normalize_name("Part 1 (1:02)"), "Part 1");
        assert_eq!(normalize_name("Mr. Smith's \"Day\"?"), "Mr Smiths Day");
        assert_eq!(normalize_name("Either/Or | Both"), "Either-Or - Both");
        assert_eq!(normalize_name("Year (1999)"), "Year (1999)");
    }

    #[test]
    fn test_parse_marker_frame() {
        let frame = "OverDrive MediaMarkers:<Markers><Marker><Name>Intro</Name><Time>0:00.000</Time></Marker>\
                     <Marker><Name>Chapter 1</Name><Time>1:30.250</Time></Marker></Markers>";
        let markers = parse_marker_frame(frame).unwrap().unwrap();
        assert_eq!(markers, vec![raw("Intro", "0:00.000"), raw("Chapter 1", "1:30.250")]);

        assert_eq!(parse_marker_frame("Encoded by:LAME").unwrap(), None);
        assert_eq!(parse_marker_frame("no separator").unwrap(), None);
        assert!(parse_marker_frame("OverDrive MediaMarkers:<Markers>").is_err());
    }

    #[test]
    fn test_end_times_stay_within_file() {
        let mut book = Audiobook::new();
        book.add_file(Path::new("Part01.mp3"), vec![raw("A", "0:00"), raw("B", "10:00")]);
        book.add_file(Path::new("Part02.mp3"), vec![raw("C", "0:00")]);

        let part1 = book.markers(Path::new("Part01.mp3")).unwrap();
        assert_eq!(part1[0].end_time.as_deref(), Some("00:10:00.000"));
        assert_eq!(part1[1].end_time, None);
        assert_eq!(book.marker_count(), 3);
    }

    #[test]
    fn test_bad_marker_time_is_skipped() {
        let mut book = Audiobook::new();
        let kept = book.add_file(
            Path::new("Part01.mp3"),
            vec![
                raw("A", "0:00"),
                raw("Broken", "x:y"),
                raw("Huge", "9999999999999999:00:00"),
                raw("B", "5:00"),
            ],
        );
        assert_eq!(kept, 2);
        let names: Vec<_> = book.chapters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(book.chapters()[0].segments[0].end.as_deref(), Some("00:05:00.000"));
    }

    #[test]
    fn test_continuation_merges_across_files() {
        let mut book = Audiobook::new();
        book.add_file(Path::new("Part01.mp3"), vec![raw("Intro", "0:00"), raw("Chapter 1", "3:00")]);
        book.add_file(Path::new("Part02.mp3"), vec![raw("Chapter 1", "0:00"), raw("Chapter 2", "20:00")]);

        let chapters = book.chapters();
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[1].name, "Chapter 1");
        assert_eq!(
            chapters[1].segments,
            vec![
                Segment {
                    source: PathBuf::from("Part01.mp3"),
                    start: "00:03:00.000".into(),
                    end: None
                },
                Segment {
                    source: PathBuf::from("Part02.mp3"),
                    start: "00:00:00.000".into(),
                    end: Some("00:20:00.000".into())
                },
            ]
        );
    }

    #[test]
    fn test_no_continuation_across_a_file_without_markers() {
        let mut book = Audiobook::new();
        book.add_file(Path::new("Part01.mp3"), vec![raw("Chapter 1", "0:00")]);
        book.add_file(Path::new("Part02.mp3"), vec![]);
        book.add_file(Path::new("Part03.mp3"), vec![raw("Chapter 1", "0:00")]);

        let chapters = book.chapters();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].segments.len(), 1);
        assert_eq!(chapters[1].name, "Chapter 1 II");
        assert_eq!(chapters[1].segments[0].source, PathBuf::from("Part03.mp3"));
    }

    #[test]
    fn test_non_adjacent_collision_is_renamed() {
        let mut book = Audiobook::new();
        book.add_file(Path::new("Part01.mp3"), vec![raw("Interlude", "0:00"), raw("Chapter 1", "1:00")]);
        book.add_file(Path::new("Part02.mp3"), vec![raw("Chapter 2", "0:00"), raw("Interlude", "9:00")]);
        book.add_file(Path::new("Part03.mp3"), vec![raw("Interlude", "0:00")]);

        let names: Vec<_> = book.chapters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Interlude", "Chapter 1", "Chapter 2", "Interlude II"]);
        assert_eq!(book.chapters()[3].segments.len(), 2);

        book.add_file(Path::new("Part04.mp3"), vec![raw("Outro", "0:00"), raw("Interlude", "2:00")]);
        assert_eq!(book.chapters().last().unwrap().name, "Interlude III");
    }

    #[test]
    fn test_output_file_names() {
        let mut book = Audiobook::new();
        let markers: Vec<_> = (0..10).map(|i| raw(&format!("Chapter {}", i), &format!("{}:00", i))).collect();
        book.add_file(Path::new("Part01.mp3"), markers);

        let names = book.output_file_names();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "00 - Chapter 0.mp3");
        assert_eq!(names[9], "09 - Chapter 9.mp3");
    }
}
