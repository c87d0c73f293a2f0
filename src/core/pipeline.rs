//! Post-upload pipelines.
//!
//! - `ImagePipeline`: rebuild the site, then refresh album manifests
//! - `VoicePipeline`: transcribe a voice note, hand it to the photo agent
//!   about the paired photo, then delete the audio
//!
//! Both run strictly sequentially with no retries. Rebuilds from concurrent
//! sessions share one output tree, so they are serialized. Every failure is a
//! `PipelineError`; the audio file is only removed after the agent succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, instrument};

use crate::adapters::{RegenerationError, SiteGenerator};
use crate::agent::{AgentError, AgentInvocation, AgentOutcome, AgentRunner};
use crate::ingest::{Transcriber, TranscriptionError};
use crate::library::{ManifestError, ManifestGenerator};

use super::safety::{SafetyLimits, SafetyViolation};

/// Errors from a pipeline run, after the upload was acknowledged
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Site rebuild failed: {0}")]
    Regeneration(#[from] RegenerationError),

    #[error("Manifest generation failed: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Photo agent failed: {0}")]
    Agent(#[from] AgentError),

    #[error("No photo {photo} for voice note {audio}")]
    MissingPhoto { photo: PathBuf, audio: PathBuf },

    #[error("Instruction rejected: {0}")]
    Limit(#[from] SafetyViolation),

    #[error("Failed to remove {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Dispatch aborted: {0}")]
    Aborted(String),
}

/// Rebuilds the site after an image upload
pub struct ImagePipeline {
    site: Arc<dyn SiteGenerator>,
    manifest: Option<ManifestGenerator>,
    /// Held for the rebuild and the manifest refresh
    rebuild_lock: Mutex<()>,
}

impl ImagePipeline {
    pub fn new(site: Arc<dyn SiteGenerator>) -> Self {
        Self {
            site,
            manifest: None,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Also regenerate album manifests after every successful rebuild
    pub fn with_manifest(mut self, manifest: ManifestGenerator) -> Self {
        self.manifest = Some(manifest);
        self
    }

    #[instrument(skip(self, path), fields(path = %path.display(), generator = self.site.name()))]
    pub async fn run(&self, path: &Path) -> Result<(), PipelineError> {
        let _rebuild = self.rebuild_lock.lock().await;
        self.site.regenerate().await?;
        info!("Site rebuilt");

        if let Some(manifest) = &self.manifest {
            let generator = manifest.clone();
            tokio::task::spawn_blocking(move || generator.generate_all())
                .await
                .map_err(|e| PipelineError::Aborted(e.to_string()))??;
        }

        Ok(())
    }
}

/// Result of a voice pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceOutcome {
    /// Voice note that was processed (now deleted)
    pub audio: PathBuf,

    /// Photo the instruction was about
    pub photo: PathBuf,

    /// Transcribed instruction
    pub transcript: String,

    pub agent: AgentOutcome,
}

/// Acts on a voice note about a photo
pub struct VoicePipeline {
    transcriber: Arc<dyn Transcriber>,
    agent: Arc<dyn AgentRunner>,
    base_url: String,
    photo_extension: String,
    require_paired_photo: bool,
    limits: SafetyLimits,
}

impl VoicePipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        agent: Arc<dyn AgentRunner>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transcriber,
            agent,
            base_url: base_url.into(),
            photo_extension: "JPG".to_string(),
            require_paired_photo: true,
            limits: SafetyLimits::default(),
        }
    }

    pub fn with_photo_extension(mut self, extension: impl Into<String>) -> Self {
        self.photo_extension = extension.into();
        self
    }

    pub fn require_paired_photo(mut self, required: bool) -> Self {
        self.require_paired_photo = required;
        self
    }

    pub fn with_limits(mut self, limits: SafetyLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Photo a voice note refers to: same path, photo extension
    pub fn paired_photo_path(&self, audio: &Path) -> PathBuf {
        audio.with_extension(&self.photo_extension)
    }

    #[instrument(skip(self, audio), fields(audio = %audio.display()))]
    pub async fn run(&self, audio: &Path) -> Result<VoiceOutcome, PipelineError> {
        let photo = self.paired_photo_path(audio);

        if self.require_paired_photo && !tokio::fs::try_exists(&photo).await.unwrap_or(false) {
            return Err(PipelineError::MissingPhoto {
                photo,
                audio: audio.to_path_buf(),
            });
        }

        let limit = self.limits.transcription_timeout();
        let transcript = timeout(limit, self.transcriber.transcribe(audio))
            .await
            .map_err(|_| TranscriptionError::Timeout(limit))??;

        info!(
            backend = self.transcriber.name(),
            text = %transcript.text,
            "Transcribed voice note"
        );

        self.limits.validate_instruction(&transcript.text)?;

        let invocation = AgentInvocation {
            photo_path: photo.clone(),
            base_url: self.base_url.clone(),
            instruction: transcript.text.clone(),
        };
        let outcome = self.agent.run(&invocation).await?;

        tokio::fs::remove_file(audio)
            .await
            .map_err(|source| PipelineError::Cleanup {
                path: audio.to_path_buf(),
                source,
            })?;

        Ok(VoiceOutcome {
            audio: audio.to_path_buf(),
            photo,
            transcript: transcript.text,
            agent: outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ShareAction, ShareScope};
    use crate::ingest::Transcript;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn transcribe(&self, _audio: &Path) -> Result<Transcript, TranscriptionError> {
            Ok(Transcript::text(self.0))
        }
    }

    #[derive(Default)]
    struct CountingAgent {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl AgentRunner for CountingAgent {
        async fn run(&self, invocation: &AgentInvocation) -> Result<AgentOutcome, AgentError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(AgentOutcome {
                result: format!("ran for {}", invocation.photo_path.display()),
                actions: vec![ShareAction {
                    scope: ShareScope::Album,
                    target: "family".to_string(),
                    success: true,
                }],
                steps: 1,
            })
        }
    }

    #[test]
    fn test_paired_photo_path() {
        let pipeline = VoicePipeline::new(
            Arc::new(FixedTranscriber("x")),
            Arc::new(CountingAgent::default()),
            "https://x",
        );

        assert_eq!(
            pipeline.paired_photo_path(Path::new("/g/2024-03-05/IMG_1.WAV")),
            PathBuf::from("/g/2024-03-05/IMG_1.JPG")
        );
        assert_eq!(
            pipeline
                .with_photo_extension("jpg")
                .paired_photo_path(Path::new("a/IMG_1.WAV")),
            PathBuf::from("a/IMG_1.jpg")
        );
    }

    #[tokio::test]
    async fn test_missing_photo_fails_fast() {
        let temp = TempDir::new().unwrap();
        let audio = temp.path().join("IMG_1.WAV");
        std::fs::write(&audio, b"RIFF").unwrap();

        let agent = Arc::new(CountingAgent::default());
        let pipeline =
            VoicePipeline::new(Arc::new(FixedTranscriber("share")), agent.clone(), "https://x");

        let result = pipeline.run(&audio).await;
        assert!(matches!(result, Err(PipelineError::MissingPhoto { .. })));
        assert_eq!(agent.runs.load(Ordering::SeqCst), 0);
        assert!(audio.exists());
    }

    #[tokio::test]
    async fn test_missing_photo_tolerated_when_not_required() {
        let temp = TempDir::new().unwrap();
        let audio = temp.path().join("IMG_1.WAV");
        std::fs::write(&audio, b"RIFF").unwrap();

        let agent = Arc::new(CountingAgent::default());
        let pipeline =
            VoicePipeline::new(Arc::new(FixedTranscriber("share")), agent.clone(), "https://x")
                .require_paired_photo(false);

        let outcome = pipeline.run(&audio).await.unwrap();
        assert_eq!(outcome.transcript, "share");
        assert_eq!(agent.runs.load(Ordering::SeqCst), 1);
        assert!(!audio.exists());
    }

    #[tokio::test]
    async fn test_oversized_instruction_rejected() {
        let temp = TempDir::new().unwrap();
        let audio = temp.path().join("IMG_1.WAV");
        std::fs::write(&audio, b"RIFF").unwrap();
        std::fs::write(temp.path().join("IMG_1.JPG"), b"jpeg").unwrap();

        let agent = Arc::new(CountingAgent::default());
        let pipeline = VoicePipeline::new(
            Arc::new(FixedTranscriber("share this with everyone")),
            agent.clone(),
            "https://x",
        )
        .with_limits(SafetyLimits {
            max_instruction_bytes: 4,
            ..Default::default()
        });

        let result = pipeline.run(&audio).await;
        assert!(matches!(result, Err(PipelineError::Limit(_))));
        assert_eq!(agent.runs.load(Ordering::SeqCst), 0);
        assert!(audio.exists());
    }
}
