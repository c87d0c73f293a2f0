//! Tools offered to the photo agent.
//!
//! `share_album` and `share_photo` act through a `Sharer`; `final_result`
//! ends the run with the model's summary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::llm::{ToolCall, ToolDefinition};
use super::AgentError;

pub const SHARE_ALBUM: &str = "share_album";
pub const SHARE_PHOTO: &str = "share_photo";
pub const FINAL_RESULT: &str = "final_result";

/// What a share action covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareScope {
    Album,
    Photo,
}

/// A share performed during one agent run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAction {
    pub scope: ShareScope,
    pub target: String,
    pub success: bool,
}

/// Performs share actions on behalf of the agent
#[async_trait]
pub trait Sharer: Send + Sync {
    /// Share `url` with `target`. Returns whether the share succeeded.
    async fn share(&self, scope: ShareScope, target: &str, url: &str) -> bool;
}

/// Sharer that only logs what it would have shared
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSharer;

#[async_trait]
impl Sharer for LoggingSharer {
    async fn share(&self, scope: ShareScope, target: &str, url: &str) -> bool {
        tracing::info!(scope = ?scope, target = %target, url = %url, "Would have shared");
        true
    }
}

#[derive(Debug, Deserialize)]
struct TargetArgs {
    target: String,
}

#[derive(Debug, Deserialize)]
struct ResultArgs {
    result: String,
}

/// A decoded tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    Share { scope: ShareScope, target: String },
    FinalResult { result: String },
}

impl ToolInvocation {
    /// Decode a model tool call against the known tool set
    pub fn parse(call: &ToolCall) -> Result<Self, AgentError> {
        let malformed = |e: serde_json::Error| AgentError::MalformedArguments {
            tool: call.name.clone(),
            reason: e.to_string(),
        };

        match call.name.as_str() {
            SHARE_ALBUM | SHARE_PHOTO => {
                let args: TargetArgs =
                    serde_json::from_value(call.arguments.clone()).map_err(malformed)?;
                let scope = if call.name == SHARE_ALBUM {
                    ShareScope::Album
                } else {
                    ShareScope::Photo
                };
                Ok(Self::Share {
                    scope,
                    target: args.target,
                })
            }
            FINAL_RESULT => {
                let args: ResultArgs =
                    serde_json::from_value(call.arguments.clone()).map_err(malformed)?;
                Ok(Self::FinalResult {
                    result: args.result,
                })
            }
            other => Err(AgentError::UnknownTool(other.to_string())),
        }
    }
}

fn target_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "target": {
                "type": "string",
                "description": "Who to share with, e.g. 'family' or 'julie'"
            }
        },
        "required": ["target"]
    })
}

/// Tool definitions offered on every model call
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: SHARE_ALBUM.to_string(),
            description: "Shares the photo album to a target such as 'family' or 'julie'. \
                          Returns whether the share was successful."
                .to_string(),
            parameters: target_schema(),
        },
        ToolDefinition {
            name: SHARE_PHOTO.to_string(),
            description: "Shares the photo to a target such as 'family' or 'julie'. \
                          Returns whether the share was successful."
                .to_string(),
            parameters: target_schema(),
        },
        ToolDefinition {
            name: FINAL_RESULT.to_string(),
            description: "Report the result of the action(s). Call this once all \
                          requested actions are done."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "result": {
                        "type": "string",
                        "description": "The result of the action(s)"
                    }
                },
                "required": ["result"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_parse_share_calls() {
        assert_eq!(
            ToolInvocation::parse(&call(SHARE_PHOTO, json!({"target": "family"}))).unwrap(),
            ToolInvocation::Share {
                scope: ShareScope::Photo,
                target: "family".to_string()
            }
        );
        assert_eq!(
            ToolInvocation::parse(&call(SHARE_ALBUM, json!({"target": "julie"}))).unwrap(),
            ToolInvocation::Share {
                scope: ShareScope::Album,
                target: "julie".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        let result = ToolInvocation::parse(&call(SHARE_PHOTO, json!({"who": "family"})));
        assert!(matches!(result, Err(AgentError::MalformedArguments { .. })));

        let result = ToolInvocation::parse(&call(FINAL_RESULT, json!("not an object")));
        assert!(matches!(result, Err(AgentError::MalformedArguments { .. })));
    }

    #[test]
    fn test_parse_rejects_unknown_tool() {
        let result = ToolInvocation::parse(&call("delete_album", json!({})));
        assert!(matches!(result, Err(AgentError::UnknownTool(name)) if name == "delete_album"));
    }

    #[test]
    fn test_definitions_cover_tool_set() {
        let names: Vec<_> = definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![SHARE_ALBUM, SHARE_PHOTO, FINAL_RESULT]);
    }

    #[tokio::test]
    async fn test_logging_sharer_reports_success() {
        assert!(LoggingSharer.share(ShareScope::Album, "family", "https://x/a").await);
    }
}
