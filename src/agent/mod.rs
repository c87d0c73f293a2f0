//! Photo agent.
//!
//! Hands a voice instruction about one photo to a tool-calling model and
//! drives the conversation until the model reports a result:
//!
//! ```text
//! Start → ModelCall → ToolCall → ModelCall → ... → Terminal
//! ```
//!
//! Every run is bounded by a step count, a per-call timeout and a
//! whole-run timeout (see `SafetyLimits`).

pub mod llm;
pub mod state;
pub mod tools;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;

use crate::core::safety::{SafetyLimits, SafetyTracker, SafetyViolation};

pub use llm::{
    Completion, CompletionOptions, LlmError, LlmProvider, Message, Role, ToolCall,
    ToolDefinition,
};
pub use state::AgentState;
pub use tools::{LoggingSharer, ShareAction, ShareScope, Sharer, ToolInvocation};

const SYSTEM_PROMPT: &str =
    "You are a photo management agent, who tries to perform the tasks asked of you.";

const FINAL_RESULT_REMINDER: &str =
    "Call the final_result tool with the result of the action(s) to finish.";

/// Errors that end an agent run
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model called unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Malformed arguments for tool '{tool}': {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("Model replied without calling final_result: {0}")]
    MalformedOutput(String),

    #[error("Agent limit reached: {0}")]
    Limit(#[from] SafetyViolation),

    #[error("Agent run timed out after {0:?}")]
    Timeout(Duration),

    #[error("Photo path has no file name: {0}")]
    InvalidPhotoPath(PathBuf),
}

/// One request to the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    /// Photo the instruction is about
    pub photo_path: PathBuf,

    /// Public base URL of the site
    pub base_url: String,

    /// What the user asked for (the transcript)
    pub instruction: String,
}

/// What the agent did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutcome {
    /// The model's summary from `final_result`
    pub result: String,

    /// Shares performed, in call order
    pub actions: Vec<ShareAction>,

    /// Model calls made
    pub steps: u32,
}

/// Public URLs and name of the photo, as shown to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoContext {
    pub filename: String,
    pub photo_url: String,
    pub album_url: String,
}

impl PhotoContext {
    /// Photo URL is the base plus the last three path segments; the album URL
    /// drops the file name from those.
    pub fn derive(photo_path: &Path, base_url: &str) -> Result<Self, AgentError> {
        let segments: Vec<String> = photo_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let filename = segments
            .last()
            .cloned()
            .ok_or_else(|| AgentError::InvalidPhotoPath(photo_path.to_path_buf()))?;

        let tail = &segments[segments.len().saturating_sub(3)..];
        let album = &tail[..tail.len() - 1];
        let base = base_url.trim_end_matches('/');

        Ok(Self {
            filename,
            photo_url: format!("{}/{}", base, tail.join("/")),
            album_url: format!("{}/{}", base, album.join("/")),
        })
    }

    /// Context block handed to the model as a system message
    pub fn render(&self) -> String {
        format!(
            "The photo file name is '{}'.\n\
             The URL to access the photo is at: {}.\n\
             The URL to access the whole album is at: {}.",
            self.filename, self.photo_url, self.album_url
        )
    }

    fn url_for(&self, scope: ShareScope) -> &str {
        match scope {
            ShareScope::Album => &self.album_url,
            ShareScope::Photo => &self.photo_url,
        }
    }
}

/// Runs an agent invocation to completion
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, invocation: &AgentInvocation) -> Result<AgentOutcome, AgentError>;
}

/// Tool-calling photo agent over any `LlmProvider`
pub struct PhotoAgent {
    provider: Arc<dyn LlmProvider>,
    sharer: Arc<dyn Sharer>,
    limits: SafetyLimits,
}

impl PhotoAgent {
    /// Agent whose share tools only log
    pub fn new(provider: Arc<dyn LlmProvider>, limits: SafetyLimits) -> Self {
        Self {
            provider,
            sharer: Arc::new(LoggingSharer),
            limits,
        }
    }

    pub fn with_sharer(mut self, sharer: Arc<dyn Sharer>) -> Self {
        self.sharer = sharer;
        self
    }

    async fn drive(&self, invocation: &AgentInvocation) -> Result<AgentOutcome, AgentError> {
        let context = PhotoContext::derive(&invocation.photo_path, &invocation.base_url)?;
        let tools = tools::definitions();
        let options = CompletionOptions {
            timeout: self.limits.model_call_timeout(),
            ..Default::default()
        };

        let mut messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::system(context.render()),
            Message::user(&invocation.instruction),
        ];
        let mut tracker = SafetyTracker::new();
        let mut actions = Vec::new();
        let mut reminded = false;
        let mut state = AgentState::Start;

        loop {
            state = match state {
                AgentState::Start => AgentState::ModelCall,

                AgentState::ModelCall => {
                    self.limits.check(&tracker)?;
                    tracker.record_step();

                    let completion = timeout(
                        options.timeout,
                        self.provider.complete(&messages, &tools, &options),
                    )
                    .await
                    .map_err(|_| LlmError::Timeout)??;

                    if completion.tool_calls.is_empty() {
                        if reminded {
                            return Err(AgentError::MalformedOutput(completion.content));
                        }
                        reminded = true;
                        messages.push(Message::assistant(completion.content));
                        messages.push(Message::user(FINAL_RESULT_REMINDER));
                        AgentState::ModelCall
                    } else {
                        messages.push(Message::assistant_with_tools(
                            completion.content,
                            completion.tool_calls.clone(),
                        ));
                        AgentState::ToolCall(completion.tool_calls)
                    }
                }

                AgentState::ToolCall(calls) => {
                    let mut final_result = None;

                    for call in &calls {
                        match ToolInvocation::parse(call)? {
                            ToolInvocation::Share { scope, target } => {
                                let success = self
                                    .sharer
                                    .share(scope, &target, context.url_for(scope))
                                    .await;
                                messages.push(Message::tool_result(&call.id, success.to_string()));
                                actions.push(ShareAction {
                                    scope,
                                    target,
                                    success,
                                });
                            }
                            ToolInvocation::FinalResult { result } => {
                                final_result = Some(result);
                            }
                        }
                    }

                    match final_result {
                        Some(result) => AgentState::Terminal(result),
                        None => AgentState::ModelCall,
                    }
                }

                AgentState::Terminal(result) => {
                    return Ok(AgentOutcome {
                        result,
                        actions,
                        steps: tracker.steps_executed,
                    });
                }
            };

            tracing::debug!(
                state = state.label(),
                terminal = state.is_terminal(),
                steps = tracker.steps_executed,
                "Agent transition"
            );
        }
    }
}

#[async_trait]
impl AgentRunner for PhotoAgent {
    #[tracing::instrument(skip_all, fields(photo = %invocation.photo_path.display(), model = self.provider.model()))]
    async fn run(&self, invocation: &AgentInvocation) -> Result<AgentOutcome, AgentError> {
        let limit = self.limits.agent_timeout();
        let outcome = timeout(limit, self.drive(invocation))
            .await
            .map_err(|_| AgentError::Timeout(limit))??;

        tracing::info!(
            steps = outcome.steps,
            shares = outcome.actions.len(),
            result = %outcome.result,
            "Agent finished"
        );
        Ok(outcome)
    }
}
