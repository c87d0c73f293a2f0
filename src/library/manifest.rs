//! Per-album media manifests for live gallery polling.
//!
//! After every site build each album directory under the source root gets a
//! `data.json` in the matching output directory:
//!
//! ```json
//! [
//!   { "file": "IMG_0001.jpg", "date": "2024-03-05T14:02:11+00:00" }
//! ]
//! ```
//!
//! Listings are fully regenerated, never merged. Albums without media are
//! skipped and a failing album does not stop the others.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{default_media_patterns, paths, ManifestSettings};

/// Errors from manifest generation
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Invalid media pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One media entry in an album listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Media file name as published
    pub file: String,

    /// Modification time, RFC 3339 in the configured timezone
    pub date: String,
}

/// Summary of one full generation pass
#[derive(Debug, Clone, Default)]
pub struct ManifestReport {
    /// Manifests written
    pub written: Vec<PathBuf>,

    /// Albums skipped for having no media
    pub skipped: usize,

    /// Albums whose manifest could not be produced
    pub failed: usize,
}

/// Writes `data.json` listings for every album under a source root
#[derive(Debug, Clone)]
pub struct ManifestGenerator {
    source_root: PathBuf,
    output_root: PathBuf,
    timezone: Tz,
    patterns: Vec<Pattern>,
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

impl ManifestGenerator {
    /// Generator matching the default image patterns
    pub fn new(
        source_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        timezone: Tz,
    ) -> Result<Self, ManifestError> {
        Self::with_patterns(source_root, output_root, timezone, &default_media_patterns())
    }

    pub fn with_patterns(
        source_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        timezone: Tz,
        patterns: &[String],
    ) -> Result<Self, ManifestError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|source| ManifestError::Pattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
            timezone,
            patterns,
        })
    }

    pub fn from_config(settings: &ManifestSettings, timezone: Tz) -> Result<Self, ManifestError> {
        Self::with_patterns(&settings.source, &settings.output, timezone, &settings.patterns)
    }

    /// Regenerate the manifest of every album under the source root
    pub fn generate_all(&self) -> Result<ManifestReport, ManifestError> {
        let mut report = ManifestReport::default();
        let mut pending = vec![self.source_root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(source) if dir == self.source_root => {
                    return Err(ManifestError::Read { path: dir, source })
                }
                Err(e) => {
                    tracing::error!(album = %dir.display(), error = %e, "Failed to read album");
                    report.failed += 1;
                    continue;
                }
            };

            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    pending.push(entry.path());
                }
            }

            let relative = dir.strip_prefix(&self.source_root).unwrap_or(Path::new(""));
            let output = paths::manifest_path(&self.output_root, relative);

            match self.generate_album(&dir, &output) {
                Ok(Some(count)) => {
                    tracing::debug!(
                        manifest = %output.display(),
                        items = count,
                        "Wrote manifest"
                    );
                    report.written.push(output);
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(album = %dir.display(), error = %e, "Failed to write manifest");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            written = report.written.len(),
            skipped = report.skipped,
            failed = report.failed,
            "Generated manifests"
        );
        Ok(report)
    }

    /// Write one album's manifest. `None` when the album has no media.
    pub fn generate_album(
        &self,
        album_dir: &Path,
        output: &Path,
    ) -> Result<Option<usize>, ManifestError> {
        let records = self.collect(album_dir)?;
        if records.is_empty() {
            return Ok(None);
        }

        let json = serde_json::to_string_pretty(&records)?;
        write_replacing(output, json.as_bytes())?;
        Ok(Some(records.len()))
    }

    /// Media records of one album directory, ordered by file name
    pub fn collect(&self, album_dir: &Path) -> Result<Vec<ManifestRecord>, ManifestError> {
        let entries = fs::read_dir(album_dir).map_err(|source| ManifestError::Read {
            path: album_dir.to_path_buf(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !self.is_media(&name) {
                continue;
            }

            let modified = entry.metadata().and_then(|m| {
                if m.is_file() {
                    m.modified()
                } else {
                    Err(std::io::Error::other("not a file"))
                }
            });

            match modified {
                Ok(mtime) => records.push(ManifestRecord {
                    date: self.format_date(DateTime::<Utc>::from(mtime)),
                    file: name,
                }),
                Err(e) => {
                    tracing::warn!(media = %entry.path().display(), error = %e, "Skipping media");
                }
            }
        }

        records.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(records)
    }

    fn is_media(&self, name: &str) -> bool {
        let options = match_options();
        self.patterns.iter().any(|p| p.matches_with(name, options))
    }

    fn format_date(&self, time: DateTime<Utc>) -> String {
        time.with_timezone(&self.timezone)
            .fixed_offset()
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

/// Replace `path` with `contents` through a temp file in the same directory
fn write_replacing(path: &Path, contents: &[u8]) -> Result<(), ManifestError> {
    let write_err = |source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(contents).map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
