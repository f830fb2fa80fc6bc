//! Marker collection and split orchestration without real media tools
//!
//! Tags come from a `StaticTagReader`; `ffmpeg` points at a missing binary
//! so every chapter cut fails in a predictable way.

use odm_core::audio::{ChapterSplitter, FileTags, SplitOptions, StaticTagReader};
use odm_core::OdmError;
use std::path::{Path, PathBuf};

fn marker_frame(markers: &[(&str, &str)]) -> String {
    let body: String = markers
        .iter()
        .map(|(name, time)| format!("<Marker><Name>{}</Name><Time>{}</Time></Marker>", name, time))
        .collect();
    format!("OverDrive MediaMarkers:<Markers>{}</Markers>", body)
}

fn tags(markers: &[(&str, &str)]) -> FileTags {
    FileTags {
        text_frames: vec!["encoder:LAME".to_string(), marker_frame(markers)],
        ..FileTags::default()
    }
}

/// Three parts; a chapter continues from the first part into the second and
/// the third part reuses the name of the opening chapter.
fn book_reader() -> StaticTagReader {
    let mut reader = StaticTagReader::new();
    reader.insert(
        "Part01.mp3",
        FileTags {
            artist: Some("Ada Writer".into()),
            genre: Some("Fiction".into()),
            comment: Some("A long road.".into()),
            ..tags(&[
                ("Opening", "0:00.000"),
                ("Chapter 1", "1:30.000"),
                ("Chapter 2 (00:30:00)", "30:00.000"),
            ])
        },
    );
    reader.insert("Part02.mp3", tags(&[("Chapter 2", "0:00.000"), ("Chapter 3", "61:05")]));
    reader.insert("Part03.mp3", tags(&[("Broken", "x:y"), ("Opening", "0:00")]));
    reader
}

fn write_parts(dir: &Path) {
    for name in ["Part01.mp3", "Part02.mp3", "Part03.mp3"] {
        std::fs::write(dir.join(name), b"ID3 audio").unwrap();
    }
}

fn missing_ffmpeg(dir: &Path) -> PathBuf {
    dir.join("no-such-ffmpeg")
}

#[tokio::test]
async fn test_read_audiobook_merges_continuations() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    write_parts(dir.path());

    let splitter = ChapterSplitter::new(book_reader());
    let book = splitter.read_audiobook(dir.path()).await?;

    let names: Vec<_> = book.chapters().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Opening", "Chapter 1", "Chapter 2", "Chapter 3", "Opening II"]);

    let continued = &book.chapters()[2];
    assert_eq!(continued.segments.len(), 2);
    assert_eq!(continued.segments[0].source, dir.path().join("Part01.mp3"));
    assert_eq!(continued.segments[0].start, "00:30:00.000");
    assert_eq!(continued.segments[0].end, None);
    assert_eq!(continued.segments[1].source, dir.path().join("Part02.mp3"));
    assert_eq!(continued.segments[1].start, "00:00:00.000");
    assert_eq!(continued.segments[1].end.as_deref(), Some("01:01:05.000"));

    // The marker with an unreadable time is dropped
    assert_eq!(book.marker_count(), 6);
    let third = book.markers(&dir.path().join("Part03.mp3")).unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].name, "Opening");

    assert_eq!(
        book.output_file_names(),
        vec![
            "0 - Opening.mp3",
            "1 - Chapter 1.mp3",
            "2 - Chapter 2.mp3",
            "3 - Chapter 3.mp3",
            "4 - Opening II.mp3",
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_part_without_markers_breaks_continuation() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    write_parts(dir.path());

    let mut reader = StaticTagReader::new();
    reader.insert("Part01.mp3", tags(&[("Chapter 1", "0:00")]));
    reader.insert("Part03.mp3", tags(&[("Chapter 1", "0:00")]));

    let book = ChapterSplitter::new(reader).read_audiobook(dir.path()).await?;

    let names: Vec<_> = book.chapters().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Chapter 1", "Chapter 1 II"]);
    assert_eq!(book.chapters()[0].segments.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_broken_marker_payload_aborts() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("Part01.mp3"), b"ID3")?;

    let mut reader = StaticTagReader::new();
    reader.insert(
        "Part01.mp3",
        FileTags {
            text_frames: vec!["OverDrive MediaMarkers:<Markers><Marker>".to_string()],
            ..FileTags::default()
        },
    );

    let err = ChapterSplitter::new(reader)
        .read_audiobook(dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, OdmError::InvalidXml(_)));

    Ok(())
}

#[tokio::test]
async fn test_failed_cuts_are_reported_and_sources_kept() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let book_dir = dir.path().join("book");
    std::fs::create_dir(&book_dir)?;
    write_parts(&book_dir);

    let splitter = ChapterSplitter::new(book_reader()).with_ffmpeg(missing_ffmpeg(dir.path()));
    let options = SplitOptions {
        delete_sources: true,
        ..SplitOptions::new(&book_dir)
    };
    let summary = splitter.run(&options).await?;

    assert!(summary.written.is_empty());
    assert_eq!(summary.failed.len(), 5);
    assert_eq!(summary.failed[2].file_name, "2 - Chapter 2.mp3");
    assert!(!summary.is_success());
    assert!(summary.archive.is_none());

    assert!(summary.description_written);
    assert_eq!(
        std::fs::read_to_string(book_dir.join("about.html"))?,
        "A long road.<br><br>\nAda Writer\n<br>\nFiction"
    );

    for name in ["Part01.mp3", "Part02.mp3", "Part03.mp3"] {
        assert!(book_dir.join(name).exists());
    }
    // The concat list of the continued chapter is cleaned up
    assert!(!book_dir.join("2 - Chapter 2.mp3.concat.txt").exists());

    Ok(())
}

#[tokio::test]
async fn test_existing_description_is_kept() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    write_parts(dir.path());
    std::fs::write(dir.path().join("notes.txt"), "my own notes")?;

    let splitter = ChapterSplitter::new(book_reader()).with_ffmpeg(missing_ffmpeg(dir.path()));
    let summary = splitter.run(&SplitOptions::new(dir.path())).await?;

    assert!(!summary.description_written);
    assert!(!dir.path().join("about.html").exists());

    Ok(())
}

#[tokio::test]
async fn test_playlist_fallback_renames_entries() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let book_dir = dir.path().join("book");
    let outdir = dir.path().join("out");
    std::fs::create_dir(&book_dir)?;
    std::fs::write(book_dir.join("Track A.mp3"), b"a")?;
    std::fs::write(book_dir.join("Track B.mp3"), b"b")?;
    std::fs::write(book_dir.join("book.m3u"), "#EXTM3U\nTrack B.mp3\n\nTrack A.mp3\n")?;

    let splitter = ChapterSplitter::new(StaticTagReader::new()).with_ffmpeg(missing_ffmpeg(dir.path()));
    let options = SplitOptions {
        outdir: Some(outdir.clone()),
        ..SplitOptions::new(&book_dir)
    };
    let summary = splitter.run(&options).await?;

    assert_eq!(
        summary.renamed,
        vec![outdir.join("0 - Track B.mp3"), outdir.join("1 - Track A.mp3")]
    );
    assert_eq!(std::fs::read(outdir.join("0 - Track B.mp3"))?, b"b");
    assert!(!book_dir.join("Track A.mp3").exists());
    assert!(summary.written.is_empty());
    assert!(summary.failed.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_playlist_entries_outside_the_directory_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let book_dir = dir.path().join("book");
    std::fs::create_dir(&book_dir)?;
    std::fs::write(dir.path().join("outside.mp3"), b"x")?;
    std::fs::write(book_dir.join("Track A.mp3"), b"a")?;
    std::fs::write(
        book_dir.join("book.m3u"),
        format!("../outside.mp3\n{}\nTrack A.mp3\n", dir.path().join("outside.mp3").display()),
    )?;

    let splitter = ChapterSplitter::new(StaticTagReader::new()).with_ffmpeg(missing_ffmpeg(dir.path()));
    let summary = splitter.run(&SplitOptions::new(&book_dir)).await?;

    assert_eq!(summary.renamed, vec![book_dir.join("0 - Track A.mp3")]);
    assert!(dir.path().join("outside.mp3").exists());

    Ok(())
}

#[tokio::test]
async fn test_directory_without_markers_or_playlist() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("Part01.mp3"), b"ID3")?;

    let splitter = ChapterSplitter::new(StaticTagReader::new()).with_ffmpeg(missing_ffmpeg(dir.path()));
    let summary = splitter.run(&SplitOptions::new(dir.path())).await?;

    assert!(summary.written.is_empty());
    assert!(summary.renamed.is_empty());
    assert!(summary.is_success());

    Ok(())
}

#[tokio::test]
async fn test_split_requires_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Part01.mp3");
    std::fs::write(&file, b"ID3").unwrap();

    let err = ChapterSplitter::new(StaticTagReader::new())
        .read_audiobook(&file)
        .await
        .unwrap_err();
    assert!(matches!(err, OdmError::InvalidPath(_)));
}
