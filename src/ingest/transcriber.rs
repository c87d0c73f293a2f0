//! Voice note transcription.
//!
//! The default backend shells out to a local whisper binary and reads its JSON
//! output. An OpenAI-compatible HTTP backend lives in `adapters::openai`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Result of transcription
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub language: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl Transcript {
    /// Transcript with text only
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            duration_seconds: None,
        }
    }
}

/// Errors from a transcription backend
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcriber exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Transcription timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unreadable transcriber output: {0}")]
    Output(String),

    #[error("Transcription service error: {0}")]
    Service(String),

    #[error("Transcript is empty")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns an audio file into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Transcribe the whole file in one shot
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, TranscriptionError>;
}

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    end: f64,
}

/// Local whisper binary backend
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    binary_path: String,
    model: String,
    language: String,
    timeout: Duration,
}

impl WhisperTranscriber {
    pub fn new(
        binary_path: impl Into<String>,
        model: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            model: model.into(),
            language: language.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, TranscriptionError> {
        // Whisper writes <stem>.json into the output dir
        let temp_dir = tempfile::tempdir()?;

        let child = Command::new(&self.binary_path)
            .arg(audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json")
            .arg("--language")
            .arg(&self.language)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscriptionError::Spawn {
                program: self.binary_path.clone(),
                source,
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TranscriptionError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptionError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| TranscriptionError::Output(format!("{}: {}", json_path.display(), e)))?;

        parse_whisper_output(&json_content)
    }
}

fn parse_whisper_output(json: &str) -> Result<Transcript, TranscriptionError> {
    let whisper: WhisperOutput =
        serde_json::from_str(json).map_err(|e| TranscriptionError::Output(e.to_string()))?;

    let text = whisper.text.trim().to_string();
    if text.is_empty() {
        return Err(TranscriptionError::Empty);
    }

    Ok(Transcript {
        text,
        language: (!whisper.language.is_empty()).then_some(whisper.language),
        duration_seconds: whisper.segments.last().map(|s| s.end),
    })
}
