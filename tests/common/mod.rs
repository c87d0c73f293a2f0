//! Stub collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use autotag::adapters::{RegenerationError, SiteGenerator};
use autotag::agent::{
    Completion, CompletionOptions, LlmError, LlmProvider, Message, ShareScope, Sharer, ToolCall,
    ToolDefinition,
};
use autotag::ingest::{Transcriber, Transcript, TranscriptionError};

/// Transcriber returning a fixed text
#[derive(Default)]
pub struct StubTranscriber {
    pub text: String,
    pub calls: AtomicUsize,
}

impl StubTranscriber {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    fn name(&self) -> &str {
        "stub"
    }

    async fn transcribe(&self, _audio_path: &Path) -> Result<Transcript, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Transcript::text(self.text.clone()))
    }
}

/// Transcriber that always fails like a crashed whisper process
pub struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    fn name(&self) -> &str {
        "failing"
    }

    async fn transcribe(&self, _audio_path: &Path) -> Result<Transcript, TranscriptionError> {
        Err(TranscriptionError::Failed {
            code: 1,
            stderr: "model not found".to_string(),
        })
    }
}

/// Model returning queued completions in order
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Completion>>,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// Sharer remembering every share request
#[derive(Default)]
pub struct RecordingSharer {
    pub shares: Mutex<Vec<(ShareScope, String, String)>>,
}

impl RecordingSharer {
    pub fn shares(&self) -> Vec<(ShareScope, String, String)> {
        self.shares.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sharer for RecordingSharer {
    async fn share(&self, scope: ShareScope, target: &str, url: &str) -> bool {
        self.shares
            .lock()
            .unwrap()
            .push((scope, target.to_string(), url.to_string()));
        true
    }
}

/// Site generator counting rebuilds
#[derive(Default)]
pub struct RecordingSite {
    pub runs: AtomicUsize,
    pub delay: Option<Duration>,
}

impl RecordingSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteGenerator for RecordingSite {
    fn name(&self) -> &str {
        "recording"
    }

    async fn regenerate(&self) -> Result<(), RegenerationError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Site generator that panics mid-rebuild
pub struct PanickingSite;

#[async_trait]
impl SiteGenerator for PanickingSite {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn regenerate(&self) -> Result<(), RegenerationError> {
        panic!("generator crashed");
    }
}

/// Site generator tracking how many rebuilds overlap
#[derive(Default)]
pub struct OverlapSite {
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub runs: AtomicUsize,
}

impl OverlapSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteGenerator for OverlapSite {
    fn name(&self) -> &str {
        "overlap"
    }

    async fn regenerate(&self) -> Result<(), RegenerationError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Site generator that blocks until the test opens the gate
pub struct GatedSite {
    pub runs: AtomicUsize,
    gate: Semaphore,
}

impl GatedSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl SiteGenerator for GatedSite {
    fn name(&self) -> &str {
        "gated"
    }

    async fn regenerate(&self) -> Result<(), RegenerationError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await;
        Ok(())
    }
}
