//! Upload events and media classification.
//!
//! The transfer server emits exactly one `TransferEvent` per STOR. Only the
//! `Completed` variant is ever routed to a pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Image extensions, matched case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Voice note suffix, matched case-sensitively
pub const VOICE_SUFFIX: &str = ".WAV";

/// What kind of media an upload is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A photo; triggers a site rebuild
    Image,

    /// A voice note; transcribed and handed to the photo agent
    Voice,
}

impl MediaKind {
    /// Classify a path by its file name. `None` means no pipeline applies.
    pub fn classify(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;

        if name.ends_with(VOICE_SUFFIX) {
            return Some(Self::Voice);
        }

        let ext = Path::new(name).extension()?.to_str()?;
        IMAGE_EXTENSIONS
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
            .then_some(Self::Image)
    }
}

/// A file whose transfer finished and was acknowledged to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCompleted {
    pub path: PathBuf,
}

impl UploadCompleted {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// A transfer that was aborted or interrupted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadIncomplete {
    pub path: PathBuf,

    /// Bytes written before the transfer stopped
    pub bytes: u64,

    /// Why the transfer stopped
    pub reason: String,
}

/// Signal emitted by the transfer server at the end of every upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Completed(UploadCompleted),
    Incomplete(UploadIncomplete),
}
