//! Voice note ingestion.
//!
//! Turns an uploaded `.WAV` into a transcript the photo agent can act on.
//!
//! # Backends
//!
//! ```text
//! transcription.backend: whisper  → local `whisper` binary (JSON output)
//! transcription.backend: openai   → POST {endpoint}/audio/transcriptions
//! ```

pub mod transcriber;

use std::sync::Arc;

use anyhow::Result;

use crate::adapters::OpenAiClient;
use crate::config::{ResolvedConfig, TranscriptionSettings};

// Re-export key types
pub use transcriber::{Transcriber, Transcript, TranscriptionError, WhisperTranscriber};

/// Build the configured transcription backend
pub fn transcriber_from_config(config: &ResolvedConfig) -> Result<Arc<dyn Transcriber>> {
    let timeout = config.safety.transcription_timeout();

    match &config.transcription {
        TranscriptionSettings::Whisper {
            binary_path,
            model,
            language,
        } => Ok(Arc::new(WhisperTranscriber::new(
            binary_path.clone(),
            model.clone(),
            language.clone(),
            timeout,
        ))),
        TranscriptionSettings::OpenAi { model } => {
            let client = OpenAiClient::from_config(&config.openai)?
                .with_transcription_model(model.clone())
                .with_transcription_timeout(timeout);
            Ok(Arc::new(client))
        }
    }
}
