//! Reasoning client abstraction layer
//!
//! The planner talks to the reasoning service only through the
//! `ReasoningClient` trait defined here. `chat` is the tool-calling entry
//! point used by the loop; `chat_stream` serves plain-answer flows that
//! bypass the loop.
//!
//! Concrete clients live in submodules. `openai` speaks the OpenAI
//! chat-completions protocol, which OpenAI, DeepSeek and Ollama all accept.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use sdk::errors::EngineError;
use sdk::types::{Params, ToolSchema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

pub mod openai;

/// Result type for reasoning operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Lazy, finite sequence of answer fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Errors that can occur while talking to the reasoning service
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        EngineError::Reasoning(err.to_string())
    }
}

/// Message in a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system, tool)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,

    /// Tool calls requested by an assistant message, in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Originating call id for tool result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role(MessageRole::Assistant, content)
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    /// Create a new tool result message
    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(MessageRole::Tool, content)
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,

    /// Tool result message
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("unknown message role '{}'", other)),
        }
    }
}

/// Tool call request from the reasoning step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Identifier unique within one reasoning response
    pub id: String,

    /// Name of the skill to call
    pub name: String,

    /// Parsed arguments
    pub arguments: Params,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Params) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Response of one reasoning call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Text content (empty when the model only requested tools)
    pub content: String,

    /// Requested tool calls, in order
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Provider finish reason (`stop`, `tool_calls`, ...)
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Plain-content response
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Response requesting tool calls
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Reasoning service contract
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Returns the name of the backing provider (e.g., "openai", "deepseek")
    fn name(&self) -> &str;

    /// One chat-completion round trip
    ///
    /// # Arguments
    /// * `messages` - Full transcript including the system prompt
    /// * `tools` - Function-calling schemas, `None` for plain answers
    async fn chat(&self, messages: &[Message], tools: Option<&[ToolSchema]>)
        -> Result<ChatResponse>;

    /// Stream a plain answer as text fragments
    ///
    /// The default implementation performs one `chat` call without tools and
    /// yields its content as a single fragment.
    async fn chat_stream(&self, messages: &[Message]) -> Result<TextStream> {
        let response = self.chat(messages, None).await?;
        Ok(Box::pin(stream::once(async move { Ok(response.content) })))
    }
}
