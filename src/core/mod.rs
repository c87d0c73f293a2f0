//! Core upload handling.
//!
//! This module contains:
//! - Dispatcher: Routes completed uploads by media kind
//! - Pipeline: Image (site rebuild) and Voice (transcribe, agent, cleanup)
//! - Safety: Limits and timeouts for collaborator calls

pub mod dispatcher;
pub mod pipeline;
pub mod safety;

// Re-export commonly used types
pub use dispatcher::{Dispatched, Dispatcher};
pub use pipeline::{ImagePipeline, PipelineError, VoiceOutcome, VoicePipeline};
pub use safety::{SafetyLimits, SafetyTracker, SafetyViolation};
