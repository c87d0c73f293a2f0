//! Manifest Integration Tests
//!
//! `data.json` listings written for every album with media.

use std::path::Path;

use chrono_tz::Tz;
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

use autotag::library::{ManifestGenerator, ManifestRecord};

// 2024-03-05T14:02:11Z
const MTIME: i64 = 1_709_647_331;

fn media(dir: &Path, name: &str, offset: i64) {
    let path = dir.join(name);
    std::fs::write(&path, b"data").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(MTIME + offset, 0)).unwrap();
}

fn read_manifest(path: &Path) -> Vec<ManifestRecord> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_album_listing() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("galleries");
    let album = source.join("2024-03-05");
    std::fs::create_dir_all(&album).unwrap();

    media(&album, "IMG_2.jpg", 60);
    media(&album, "IMG_1.JPG", 0);
    std::fs::write(album.join("IMG_1.WAV"), b"RIFF").unwrap();
    std::fs::write(album.join("index.md"), "---\ntitle: x\n---\n").unwrap();

    let output = temp.path().join("public");
    let generator = ManifestGenerator::new(&source, &output, Tz::UTC).unwrap();
    let report = generator.generate_all().unwrap();

    let manifest = output.join("2024-03-05").join("data.json");
    assert_eq!(report.written, vec![manifest.clone()]);
    assert_eq!(report.failed, 0);

    assert_eq!(
        read_manifest(&manifest),
        vec![
            ManifestRecord {
                file: "IMG_1.JPG".to_string(),
                date: "2024-03-05T14:02:11+00:00".to_string(),
            },
            ManifestRecord {
                file: "IMG_2.jpg".to_string(),
                date: "2024-03-05T14:03:11+00:00".to_string(),
            },
        ]
    );
}

#[test]
fn test_listing_replaces_previous() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("galleries");
    let album = source.join("beach");
    std::fs::create_dir_all(&album).unwrap();
    media(&album, "IMG_1.JPG", 0);

    let output = temp.path().join("public");
    let manifest = output.join("beach").join("data.json");
    std::fs::create_dir_all(manifest.parent().unwrap()).unwrap();
    std::fs::write(&manifest, "[{\"file\": \"gone.jpg\", \"date\": \"x\"}]").unwrap();

    let generator = ManifestGenerator::new(&source, &output, Tz::UTC).unwrap();
    generator.generate_all().unwrap();

    let records = read_manifest(&manifest);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file, "IMG_1.JPG");
}

#[test]
fn test_nested_albums_and_empty_ones() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("galleries");
    std::fs::create_dir_all(source.join("2024/march")).unwrap();
    std::fs::create_dir_all(source.join("empty")).unwrap();
    media(&source.join("2024/march"), "IMG_9.png", 0);

    let output = temp.path().join("public");
    let generator = ManifestGenerator::new(&source, &output, Tz::UTC).unwrap();
    let report = generator.generate_all().unwrap();

    assert_eq!(report.written, vec![output.join("2024/march/data.json")]);
    // The root, `2024` and `empty` hold no media
    assert_eq!(report.skipped, 3);
    assert!(!output.join("empty/data.json").exists());
}

#[test]
fn test_missing_source_is_an_error() {
    let temp = TempDir::new().unwrap();
    let generator =
        ManifestGenerator::new(temp.path().join("missing"), temp.path().join("out"), Tz::UTC)
            .unwrap();

    assert!(generator.generate_all().is_err());
}
