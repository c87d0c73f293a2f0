//! OpenAI-compatible HTTP client.
//!
//! Serves two roles:
//! - `LlmProvider` over `POST {base}/chat/completions` with function tools
//! - `Transcriber` over `POST {base}/audio/transcriptions` (multipart upload)
//!
//! Works with OpenAI and any gateway implementing the same API.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::agent::llm::{
    Completion, CompletionOptions, LlmError, LlmProvider, Message, ToolCall, ToolDefinition,
};
use crate::config::OpenAiSettings;
use crate::ingest::{Transcriber, Transcript, TranscriptionError};

/// OpenAI-compatible API client
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    transcription_model: String,
    transcription_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            chat_model: "gpt-4o".to_string(),
            transcription_model: "whisper-1".to_string(),
            transcription_timeout: Duration::from_secs(300),
        }
    }

    /// Client from settings. The public OpenAI endpoint requires a key.
    pub fn from_config(settings: &OpenAiSettings) -> Result<Self> {
        if settings.api_key.is_none() && settings.base_url.contains("api.openai.com") {
            anyhow::bail!("OPENAI_API_KEY is not set");
        }

        Ok(Self::new(&settings.base_url, settings.api_key.clone())
            .with_chat_model(&settings.chat_model))
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_transcription_model(mut self, model: impl Into<String>) -> Self {
        self.transcription_model = model.into();
        self
    }

    pub fn with_transcription_timeout(mut self, timeout: Duration) -> Self {
        self.transcription_timeout = timeout;
        self
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

fn connection_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Connection(e.to_string())
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.chat_model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: messages.iter().map(ChatMessage::from).collect(),
            tools: tools.iter().map(ChatTool::from).collect(),
            temperature: options.temperature,
        };

        tracing::debug!(
            model = %self.chat_model,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .authorize(self.client.post(self.api_url("chat/completions")))
            .json(&request)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        body.into_completion()
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, TranscriptionError> {
        let file_name = audio_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let file_bytes = tokio::fs::read(audio_path).await?;

        // Build multipart form
        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Service(e.to_string()))?;

        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .text("response_format", "json")
            .part("file", file_part);

        let response = self
            .authorize(self.client.post(self.api_url("audio/transcriptions")))
            .multipart(form)
            .timeout(self.transcription_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranscriptionError::Timeout(self.transcription_timeout)
                } else {
                    TranscriptionError::Service(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Service(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Output(e.to_string()))?;

        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(TranscriptionError::Empty);
        }

        Ok(Transcript {
            text,
            language: body.language,
            duration_seconds: body.duration,
        })
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        ChatMessage {
            role: msg.role.as_str(),
            // Only a tool-calling turn may omit its content
            content: (!msg.content.is_empty() || msg.tool_calls.is_empty())
                .then(|| msg.content.clone()),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|tc| ToolCallRequest {
                    id: tc.id.clone(),
                    kind: "function",
                    function: FunctionCall {
                        name: tc.name.clone(),
                        arguments: encode_arguments(&tc.arguments),
                    },
                })
                .collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolCallRequest {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments object
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDef,
}

impl From<&ToolDefinition> for ChatTool {
    fn from(def: &ToolDefinition) -> Self {
        ChatTool {
            kind: "function",
            function: FunctionDef {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallResponse {
    id: String,
    function: FunctionCall,
}

impl ChatResponse {
    fn into_completion(self) -> Result<Completion, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: decode_arguments(&tc.function.arguments),
            })
            .collect();

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

/// Decode tool arguments, keeping undecodable text as a JSON string
fn decode_arguments(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn encode_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}
