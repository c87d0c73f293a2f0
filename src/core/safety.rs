//! Safety limits for collaborator calls.
//!
//! Prevents an unresponsive collaborator or a looping model from starving a
//! connection through configurable limits on:
//! - Number of agent model calls
//! - Instruction size handed to the agent
//! - Per-call and whole-run timeouts (model, transcription, rebuild, dispatch)

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Safety limits for one upload's pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Maximum model calls per agent invocation (default: 8)
    #[serde(default = "default_max_agent_steps")]
    pub max_agent_steps: u32,

    /// Maximum instruction size in bytes (default: 16KB)
    #[serde(default = "default_max_instruction_bytes")]
    pub max_instruction_bytes: u64,

    /// Timeout for a single model call in seconds (default: 60)
    #[serde(default = "default_model_call_timeout")]
    pub model_call_timeout_seconds: u64,

    /// Timeout for a whole agent invocation in seconds (default: 180)
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: u64,

    /// Timeout for one transcription in seconds (default: 300 = 5 min)
    #[serde(default = "default_transcription_timeout")]
    pub transcription_timeout_seconds: u64,

    /// Timeout for one site rebuild in seconds (default: 600 = 10 min)
    #[serde(default = "default_rebuild_timeout")]
    pub rebuild_timeout_seconds: u64,

    /// Timeout for a whole dispatch in seconds (default: 1200 = 20 min)
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_seconds: u64,
}

fn default_max_agent_steps() -> u32 {
    8
}
fn default_max_instruction_bytes() -> u64 {
    16 * 1024
} // 16KB
fn default_model_call_timeout() -> u64 {
    60
}
fn default_agent_timeout() -> u64 {
    180
} // 3 min
fn default_transcription_timeout() -> u64 {
    300
} // 5 min
fn default_rebuild_timeout() -> u64 {
    600
} // 10 min
fn default_dispatch_timeout() -> u64 {
    1200
} // 20 min

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_agent_steps: default_max_agent_steps(),
            max_instruction_bytes: default_max_instruction_bytes(),
            model_call_timeout_seconds: default_model_call_timeout(),
            agent_timeout_seconds: default_agent_timeout(),
            transcription_timeout_seconds: default_transcription_timeout(),
            rebuild_timeout_seconds: default_rebuild_timeout(),
            dispatch_timeout_seconds: default_dispatch_timeout(),
        }
    }
}

impl SafetyLimits {
    pub fn model_call_timeout(&self) -> Duration {
        Duration::from_secs(self.model_call_timeout_seconds)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_seconds)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_seconds)
    }

    pub fn rebuild_timeout(&self) -> Duration {
        Duration::from_secs(self.rebuild_timeout_seconds)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }

    /// Validate an agent instruction against the size limit
    pub fn validate_instruction(&self, instruction: &str) -> Result<(), SafetyViolation> {
        let size = instruction.len() as u64;
        if size > self.max_instruction_bytes {
            return Err(SafetyViolation::MaxInstructionBytes {
                actual: size,
                limit: self.max_instruction_bytes,
            });
        }
        Ok(())
    }

    /// Check tracker state before another model call
    pub fn check(&self, tracker: &SafetyTracker) -> Result<(), SafetyViolation> {
        if tracker.steps_executed >= self.max_agent_steps {
            return Err(SafetyViolation::MaxSteps {
                actual: tracker.steps_executed,
                limit: self.max_agent_steps,
            });
        }

        let elapsed = tracker.started_at.elapsed().as_secs();
        if elapsed >= self.agent_timeout_seconds {
            return Err(SafetyViolation::RunTimeout {
                elapsed_seconds: elapsed,
                limit_seconds: self.agent_timeout_seconds,
            });
        }

        Ok(())
    }
}

/// Tracks model calls during one agent invocation
#[derive(Debug, Clone)]
pub struct SafetyTracker {
    /// Number of model calls made
    pub steps_executed: u32,

    /// When the invocation started
    pub started_at: Instant,
}

impl Default for SafetyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyTracker {
    pub fn new() -> Self {
        Self {
            steps_executed: 0,
            started_at: Instant::now(),
        }
    }

    /// Record a model call
    pub fn record_step(&mut self) {
        self.steps_executed += 1;
    }
}

/// Safety violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyViolation {
    #[error("Maximum agent steps exceeded: {actual} >= {limit}")]
    MaxSteps { actual: u32, limit: u32 },

    #[error("Maximum instruction bytes exceeded: {actual} > {limit}")]
    MaxInstructionBytes { actual: u64, limit: u64 },

    #[error("Run timeout: {elapsed_seconds}s >= {limit_seconds}s")]
    RunTimeout {
        elapsed_seconds: u64,
        limit_seconds: u64,
    },
}
