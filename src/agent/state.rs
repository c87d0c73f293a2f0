//! Photo agent run state.

use super::llm::ToolCall;

/// State of one agent run.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    /// Conversation seeded, no model call yet.
    Start,

    /// Waiting for the model's next reply.
    ModelCall,

    /// The model requested tool calls.
    ToolCall(Vec<ToolCall>),

    /// `final_result` was called with this summary.
    Terminal(String),
}

impl AgentState {
    /// Check if the run is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Terminal(_))
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            AgentState::Start => "start",
            AgentState::ModelCall => "model_call",
            AgentState::ToolCall(_) => "tool_call",
            AgentState::Terminal(_) => "terminal",
        }
    }
}
