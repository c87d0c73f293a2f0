//! Upload event dispatcher.
//!
//! Routes every completed upload to the pipeline for its media kind. The
//! transfer server calls `handle` after it acknowledged the upload, so nothing
//! here can affect the transfer: failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, instrument};

use crate::domain::{MediaKind, TransferEvent, UploadCompleted};

use super::pipeline::{ImagePipeline, PipelineError, VoiceOutcome, VoicePipeline};

/// What a dispatch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The site was rebuilt for a new image
    Rebuilt,

    /// A voice note was acted upon
    Voice(VoiceOutcome),

    /// No pipeline applies to this file
    Skipped,
}

/// Routes uploads to pipelines
pub struct Dispatcher {
    image: ImagePipeline,
    voice: VoicePipeline,
    dispatch_timeout: Duration,
}

impl Dispatcher {
    pub fn new(image: ImagePipeline, voice: VoicePipeline) -> Self {
        Self {
            image,
            voice,
            dispatch_timeout: Duration::from_secs(1200),
        }
    }

    pub fn with_dispatch_timeout(mut self, limit: Duration) -> Self {
        self.dispatch_timeout = limit;
        self
    }

    /// Route one completed upload by its media kind
    #[instrument(skip(self, upload), fields(path = %upload.path.display()))]
    pub async fn dispatch(&self, upload: UploadCompleted) -> Result<Dispatched, PipelineError> {
        match MediaKind::classify(&upload.path) {
            Some(MediaKind::Image) => {
                self.image.run(&upload.path).await?;
                Ok(Dispatched::Rebuilt)
            }
            Some(MediaKind::Voice) => Ok(Dispatched::Voice(self.voice.run(&upload.path).await?)),
            None => {
                debug!("No pipeline for upload");
                Ok(Dispatched::Skipped)
            }
        }
    }

    /// Dispatch on a separate task so a panic or a hang becomes a
    /// `PipelineError` instead of taking the caller down
    pub async fn dispatch_isolated(
        self: Arc<Self>,
        upload: UploadCompleted,
    ) -> Result<Dispatched, PipelineError> {
        let limit = self.dispatch_timeout;
        let mut task = tokio::spawn(async move { self.dispatch(upload).await });

        match timeout(limit, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(PipelineError::Aborted(join_error.to_string())),
            Err(_) => {
                task.abort();
                Err(PipelineError::Timeout(limit))
            }
        }
    }

    /// Consume a transfer event. Only completed uploads are dispatched.
    pub async fn handle(self: Arc<Self>, event: TransferEvent) {
        match event {
            TransferEvent::Completed(upload) => {
                let path = upload.path.clone();
                match self.dispatch_isolated(upload).await {
                    Ok(Dispatched::Rebuilt) => {
                        info!(path = %path.display(), "Image published");
                    }
                    Ok(Dispatched::Voice(outcome)) => {
                        info!(
                            path = %path.display(),
                            result = %outcome.agent.result,
                            shares = outcome.agent.actions.len(),
                            "Voice note handled"
                        );
                    }
                    Ok(Dispatched::Skipped) => {
                        debug!(path = %path.display(), "Upload ignored");
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Pipeline failed");
                    }
                }
            }
            TransferEvent::Incomplete(upload) => {
                info!(
                    path = %upload.path.display(),
                    bytes = upload.bytes,
                    reason = %upload.reason,
                    "Transfer incomplete, not dispatching"
                );
            }
        }
    }
}
