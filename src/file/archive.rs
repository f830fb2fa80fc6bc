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


//! Archive of the original parts
//!
//! After a successful split the source parts can be packed into
//! `<outdir>/../<dirname>.zip` and removed from the directory.

use crate::error::{OdmError, Result};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::write::FileOptions;
use zip::CompressionMethod;

/// Archive location for the parts of `directory` when writing to `outdir`
pub fn archive_path(directory: &Path, outdir: &Path) -> Result<PathBuf> {
    let dir_name = directory
        .components()
        .next_back()
        .and_then(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .ok_or_else(|| {
            OdmError::InvalidPath(format!("Cannot name archive for {}", directory.display()))
        })?;

    Ok(outdir.join("..").join(format!("{}.zip", dir_name)))
}

/// Pack `sources` into a zip at `archive` and delete them
///
/// Entries are stored under their file name only. The sources are removed
/// once the archive has been finished; a failure before that leaves every
/// source in place.
pub async fn archive_and_remove(sources: Vec<PathBuf>, archive: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || {
        write_archive(&sources, &archive)?;

        for source in &sources {
            std::fs::remove_file(source).map_err(|e| {
                OdmError::FileIoError(format!("delete: {} - {}", source.display(), e))
            })?;
        }

        tracing::info!(archive = %archive.display(), files = sources.len(), "Saved original files");
        Ok(archive)
    })
    .await
    .map_err(|e| OdmError::internal(format!("archive task failed: {}", e)))?
}

fn write_archive(sources: &[PathBuf], archive: &Path) -> Result<()> {
    let file = File::create(archive).map_err(|e| {
        OdmError::FileIoError(format!("create: {} - {}", archive.display(), e))
    })?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for source in sources {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| OdmError::InvalidPath(source.display().to_string()))?;

        zip.start_file(name, options)?;
        let mut input = File::open(source).map_err(|e| {
            OdmError::FileIoError(format!("read: {} - {}", source.display(), e))
        })?;
        io::copy(&mut input, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_archive_path() {
        let path = archive_path(Path::new("/books/AdaWriter_TheLongWay/"), Path::new("/books/out")).unwrap();
        assert_eq!(path, PathBuf::from("/books/out/../AdaWriter_TheLongWay.zip"));
        assert!(archive_path(Path::new("/"), Path::new("/out")).is_err());
    }

    #[tokio::test]
    async fn test_archive_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let book = temp_dir.path().join("book");
        std::fs::create_dir(&book).unwrap();
        let part1 = book.join("Part01.mp3");
        let part2 = book.join("Part02.mp3");
        std::fs::write(&part1, b"first part").unwrap();
        std::fs::write(&part2, b"second part").unwrap();

        let archive = archive_path(&book, &book).unwrap();
        let written = archive_and_remove(vec![part1.clone(), part2.clone()], archive.clone())
            .await
            .unwrap();

        assert_eq!(written, archive);
        assert!(!part1.exists());
        assert!(!part2.exists());

        let mut zip = zip::ZipArchive::new(File::open(temp_dir.path().join("book.zip")).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut content = String::new();
        zip.by_name("Part02.mp3").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "second part");
    }
}
