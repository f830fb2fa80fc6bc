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


//! Output naming
//!
//! - Download folder: `{author}_{title}` with spaces and path-unsafe
//!   characters removed
//! - Chapter files: `{index} - {name}.mp3`, index zero-padded to the digit
//!   count of the chapter total
//! - Duplicate chapter names get a roman-style suffix: `Name II`, `Name III`

use std::collections::HashSet;
use std::path::{Component, Path};

/// Maximum length of one path component in bytes
const MAX_COMPONENT_LENGTH: usize = 255;

/// Characters that cannot appear in a folder name on any supported platform
const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Sanitize a download folder name
///
/// Whitespace is dropped entirely, as are path separators, reserved
/// characters and control characters. Leading dots are stripped so the
/// folder can never be `.` or `..`.
pub fn sanitize_folder_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control() && !UNSAFE_CHARS.contains(c))
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    let cleaned = truncate_component(cleaned, MAX_COMPONENT_LENGTH);

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Whether `name` is a single plain file name
///
/// Rejects empty names, `.`/`..`, absolute paths and anything with a
/// directory part, so joining it onto a folder stays inside that folder.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Number of digits used for chapter indices
pub fn index_width(count: usize) -> usize {
    count.to_string().len()
}

/// Output file name of one chapter
pub fn chapter_file_name(index: usize, width: usize, name: &str) -> String {
    let file_name = format!("{:0width$} - {}.mp3", index, name, width = width);
    if file_name.len() <= MAX_COMPONENT_LENGTH {
        return file_name;
    }

    let prefix = format!("{:0width$} - ", index, width = width);
    let budget = MAX_COMPONENT_LENGTH - prefix.len() - ".mp3".len();
    format!("{}{}.mp3", prefix, truncate_component(name, budget))
}

/// Rename `name` until it does not collide with `taken`
///
/// The first collision becomes `"{name} II"`; each further collision adds
/// another `I`.
pub fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }

    let mut candidate = format!("{} II", name);
    while taken.contains(&candidate) {
        candidate.push('I');
    }
    candidate
}

/// Truncate path component to fit within byte limit
pub fn truncate_component(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    // Find valid UTF-8 boundary
    let mut index = max_bytes;
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    text[..index].trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_plain_file_name() {
        assert!(is_plain_file_name("Part01.mp3"));
        assert!(is_plain_file_name("Track A.mp3"));
        for bad in ["", ".", "..", "../escaped.mp3", "/tmp/abs.mp3", "sub/Part01.mp3", "..\\up.mp3"] {
            assert!(!is_plain_file_name(bad), "{:?}", bad);
        }
    }

    #[test]
    fn test_sanitize_folder_name() {
        assert_eq!(sanitize_folder_name("Ada Writer_The Long Way"), "AdaWriter_TheLongWay");
        assert_eq!(sanitize_folder_name("A/B: C?"), "ABC");
        assert_eq!(sanitize_folder_name("../etc"), "etc");
        assert_eq!(sanitize_folder_name("  "), "_");
    }

    #[test]
    fn test_index_width() {
        assert_eq!(index_width(0), 1);
        assert_eq!(index_width(9), 1);
        assert_eq!(index_width(10), 2);
        assert_eq!(index_width(120), 3);
    }

    #[test]
    fn test_chapter_file_name() {
        assert_eq!(chapter_file_name(0, 2, "Opening Credits"), "00 - Opening Credits.mp3");
        assert_eq!(chapter_file_name(7, 1, "Chapter 7"), "7 - Chapter 7.mp3");
        assert_eq!(chapter_file_name(12, 3, "x"), "012 - x.mp3");

        let long = "n".repeat(400);
        assert!(chapter_file_name(1, 2, &long).len() <= MAX_COMPONENT_LENGTH);
    }

    #[test]
    fn test_unique_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("Intro", &taken), "Intro");

        taken.insert("Intro".to_string());
        assert_eq!(unique_name("Intro", &taken), "Intro II");

        taken.insert("Intro II".to_string());
        assert_eq!(unique_name("Intro", &taken), "Intro III");
    }

    #[test]
    fn test_truncate_component() {
        let long_text = "a".repeat(300);
        assert_eq!(truncate_component(&long_text, 255).len(), 255);
        assert_eq!(truncate_component("é", 1), "");
    }
}
