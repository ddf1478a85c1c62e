//! Integration tests for the document builder.
//!
//! These tests write real EPUB containers and read them back with `zip`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use mangas_core::document::{BuilderPhase, DocumentBuilder, DocumentError};
use mangas_core::model::{ChapterUnit, CoverImage, PageImage, Series};
use tempfile::TempDir;

fn series() -> Series {
    Series {
        id: "s1".to_string(),
        name: "Blue & Gold".to_string(),
        description: "A story".to_string(),
        source: "mangadex".to_string(),
        ..Series::default()
    }
}

fn chapter() -> ChapterUnit {
    ChapterUnit {
        id: "c7".to_string(),
        series_id: "s1".to_string(),
        volume: "2".to_string(),
        number: "7".to_string(),
        title: "Harbor".to_string(),
        ..ChapterUnit::default()
    }
}

fn read_entry(container: &Path, suffix: &str) -> Option<Vec<u8>> {
    let mut archive =
        zip::ZipArchive::new(File::open(container).expect("open")).expect("zip archive");
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).expect("entry");
        if entry.name().ends_with(suffix) {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).expect("read entry");
            return Some(bytes);
        }
    }
    None
}

#[test]
fn test_pages_added_out_of_order_are_written_in_index_order() {
    let dir = TempDir::new().expect("temp dir");
    let mut builder = DocumentBuilder::new(dir.path());
    builder.init(&series(), &chapter()).expect("init");

    for index in [2u32, 0, 1] {
        let bytes = format!("page {index}").into_bytes();
        builder
            .next(PageImage::new(bytes, "image/jpeg", index))
            .expect("next");
    }
    assert_eq!(builder.phase(), BuilderPhase::Initialized { pages: 3 });

    let path = builder.done().expect("done");
    assert_eq!(builder.phase(), BuilderPhase::Uninitialized);
    assert!(path.starts_with(dir.path()));

    for index in 0..3 {
        let entry = read_entry(&path, &format!("images/page_{index:04}.jpg"))
            .unwrap_or_else(|| panic!("page {index} missing"));
        assert_eq!(entry, format!("page {index}").into_bytes());
    }

    let body = String::from_utf8(read_entry(&path, "chapter.xhtml").expect("chapter body"))
        .expect("utf-8 body");
    let first = body.find("page_0000.jpg").expect("first page referenced");
    let second = body.find("page_0001.jpg").expect("second page referenced");
    let third = body.find("page_0002.jpg").expect("third page referenced");
    assert!(first < second && second < third);
}

#[test]
fn test_covers_are_embedded_and_last_write_wins() {
    let dir = TempDir::new().expect("temp dir");
    let mut builder = DocumentBuilder::new(dir.path());
    builder.init(&series(), &chapter()).expect("init");

    builder
        .set_series_cover(CoverImage::new(b"old cover".to_vec(), "image/png"))
        .expect("first cover");
    builder
        .set_series_cover(CoverImage::new(b"new cover".to_vec(), "image/png"))
        .expect("second cover");
    builder
        .set_chapter_cover(CoverImage::new(b"volume two".to_vec(), "image/jpeg"))
        .expect("chapter cover");
    builder
        .next(PageImage::new(b"only page".to_vec(), "image/png", 0))
        .expect("next");

    let path = builder.done().expect("done");
    assert_eq!(
        read_entry(&path, "images/cover.png").expect("series cover"),
        b"new cover"
    );
    assert_eq!(
        read_entry(&path, "images/chapter_cover.jpg").expect("chapter cover"),
        b"volume two"
    );
}

#[test]
fn test_builder_is_reusable_after_done() {
    let dir = TempDir::new().expect("temp dir");
    let mut builder = DocumentBuilder::new(dir.path());

    builder.init(&series(), &chapter()).expect("first init");
    builder
        .next(PageImage::new(b"a".to_vec(), "image/png", 0))
        .expect("next");
    let first = builder.done().expect("first done");

    let mut second_chapter = chapter();
    second_chapter.id = "c8".to_string();
    second_chapter.number = "8".to_string();
    builder.init(&series(), &second_chapter).expect("second init");
    builder
        .next(PageImage::new(b"b".to_vec(), "image/png", 0))
        .expect("next");
    let second = builder.done().expect("second done");

    assert_ne!(first, second);
    assert!(first.exists() && second.exists());
}

#[test]
fn test_usage_errors_do_not_write_anything() {
    let dir = TempDir::new().expect("temp dir");
    let mut builder = DocumentBuilder::new(dir.path());

    let err = builder
        .next(PageImage::new(b"x".to_vec(), "image/png", 0))
        .unwrap_err();
    assert!(matches!(err, DocumentError::NotInitialized));
    assert!(err.is_usage_error());

    builder.init(&series(), &chapter()).expect("init");
    let err = builder.done().unwrap_err();
    assert!(matches!(err, DocumentError::NoPages));

    let written = std::fs::read_dir(dir.path()).expect("read dir").count();
    assert_eq!(written, 0);
}
