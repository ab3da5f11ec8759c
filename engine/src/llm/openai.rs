//! OpenAI-compatible chat-completions client
//!
//! Speaks `POST {base_url}/chat/completions` with native function calling.
//! OpenAI, DeepSeek and Ollama's `/v1` endpoint all accept this protocol,
//! so one client serves every configured provider.
//!
//! Key features:
//! - Tool schemas sent as `tools` with `tool_choice: "auto"`
//! - Assistant tool calls and tool results round-tripped in wire format
//! - SSE streaming for plain answers (`data:` lines until `[DONE]`)
//! - HTTP status mapped onto `LLMError`

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use sdk::errors::EngineError;
use sdk::types::{Params, ToolSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

use super::{ChatResponse, LLMError, Message, ReasoningClient, Result, TextStream, ToolCall};
use crate::config::LLMConfig;

/// Client for one OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAICompatibleClient {
    provider: String,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl OpenAICompatibleClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `provider` - Provider label used in logs (e.g., "deepseek")
    /// * `base_url` - Base URL without the `/chat/completions` suffix
    /// * `model` - Model name
    /// * `api_key` - Bearer token
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            provider: provider.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            temperature: 0.7,
            max_tokens: 4096,
            client,
        })
    }

    /// Build the client for the provider selected in configuration
    ///
    /// The API key is read from `OPENAI_API_KEY` / `DEEPSEEK_API_KEY`; Ollama
    /// needs none.
    pub fn from_config(config: &LLMConfig) -> std::result::Result<Self, EngineError> {
        let endpoint = config.active()?;

        let api_key = match config.api_key_env() {
            Some(var) => std::env::var(var).map_err(|_| {
                EngineError::Config(format!(
                    "{} is not set; export it to use the '{}' provider",
                    var, config.provider
                ))
            })?,
            None => "ollama".to_string(),
        };

        let client = Self::new(
            config.provider.clone(),
            endpoint.base_url.clone(),
            endpoint.model.clone(),
            api_key,
            config.request_timeout(),
        )
        .map_err(EngineError::from)?;

        Ok(client.with_sampling(config.temperature, config.max_tokens))
    }

    /// Override temperature and completion length
    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [Message],
        tools: Option<&'a [ToolSchema]>,
        stream: bool,
    ) -> CompletionRequest<'a> {
        let tools = tools.filter(|t| !t.is_empty());
        CompletionRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tool_choice: tools.map(|_| "auto"),
            tools,
            stream: stream.then_some(true),
        }
    }

    async fn send(&self, request: &CompletionRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else if e.is_connect() {
                    LLMError::ProviderUnavailable(format!(
                        "Cannot connect to {} at {}",
                        self.provider, self.base_url
                    ))
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(LLMError::AuthenticationFailed(text)),
            429 => Err(LLMError::RateLimitExceeded),
            _ => Err(LLMError::InvalidRequest(format!("{}: {}", status, text))),
        }
    }
}

#[async_trait]
impl ReasoningClient for OpenAICompatibleClient {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ChatResponse> {
        let request = self.build_request(messages, tools, false);

        tracing::debug!(
            provider = %self.provider,
            model = %self.model,
            messages = messages.len(),
            tools = request.tools.map_or(0, |t| t.len()),
            "Chat completion request"
        );

        let start = std::time::Instant::now();
        let response = self.send(&request).await?;

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse response: {}", e)))?;

        tracing::info!(
            provider = %self.provider,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat completion received"
        );

        body.into_chat_response()
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<TextStream> {
        let request = self.build_request(messages, None, true);
        let response = self.send(&request).await?;
        Ok(sse_fragments(Box::pin(response.bytes_stream())))
    }
}

/// Request body
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Outbound message format
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        Self {
            role: msg.role.as_str(),
            content: &msg.content,
            tool_calls: msg
                .tool_calls
                .as_ref()
                .map(|calls| calls.iter().map(WireToolCall::from).collect()),
            tool_call_id: msg.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded argument object
    #[serde(default)]
    arguments: String,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            },
        }
    }
}

impl WireToolCall {
    fn into_tool_call(self) -> Result<ToolCall> {
        let raw = self.function.arguments.trim();
        let arguments = if raw.is_empty() {
            Params::new()
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(LLMError::ParseError(format!(
                        "arguments of '{}' are not an object: {}",
                        self.function.name, other
                    )))
                }
                Err(e) => {
                    return Err(LLMError::ParseError(format!(
                        "arguments of '{}' are not valid JSON: {}",
                        self.function.name, e
                    )))
                }
            }
        };

        Ok(ToolCall::new(self.id, self.function.name, arguments))
    }
}

/// Response body
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl CompletionResponse {
    fn into_chat_response(self) -> Result<ChatResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::ParseError("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_tool_call)
            .collect::<Result<Vec<_>>>()?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice.finish_reason,
        })
    }
}

/// One parsed SSE line
#[derive(Debug, PartialEq)]
enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let trimmed = line.trim();
    let Some(chunk) = trimmed.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let chunk = chunk.trim();
    if chunk == "[DONE]" {
        return SseLine::Done;
    }

    serde_json::from_str::<Value>(chunk)
        .ok()
        .and_then(|value| {
            value
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|s| SseLine::Fragment(s.to_string()))
        })
        .unwrap_or(SseLine::Skip)
}

struct SseState<S> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> SseState<S> {
    /// Consume every complete line in the buffer
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
            if self.done {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        match parse_sse_line(line) {
            SseLine::Fragment(text) => self.pending.push_back(text),
            SseLine::Done => self.done = true,
            SseLine::Skip => {}
        }
    }
}

/// Turn an SSE byte stream into content fragments
fn sse_fragments<S, B>(bytes: S) -> TextStream
where
    S: Stream<Item = reqwest::Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(LLMError::NetworkError(e.to_string())), state));
                }
                None => {
                    let rest = std::mem::take(&mut state.buffer);
                    state.handle_line(&String::from_utf8_lossy(&rest));
                    state.done = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{PermissionLevel, SkillDescriptor};
    use serde_json::json;

    fn client() -> OpenAICompatibleClient {
        OpenAICompatibleClient::new(
            "deepseek",
            "https://api.deepseek.com/",
            "deepseek-chat",
            "sk-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        assert_eq!(
            client().endpoint(),
            "https://api.deepseek.com/chat/completions"
        );
    }

    #[test]
    fn test_request_with_tools() {
        let client = client();
        let tools = vec![SkillDescriptor::new("terminal", "Run", PermissionLevel::Critical)
            .with_param("command", json!({"type": "string"}), true)
            .to_tool_schema()];
        let call = ToolCall::new(
            "call_1",
            "terminal",
            json!({"command": "ls"}).as_object().cloned().unwrap(),
        );
        let messages = vec![
            Message::system("persona"),
            Message::user("list files"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool_result(r#"{"success":true}"#, "call_1"),
        ];

        let body = serde_json::to_value(client.build_request(&messages, Some(tools.as_slice()), false)).unwrap();

        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "terminal");
        assert_eq!(body["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            r#"{"command":"ls"}"#
        );
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_request_without_tools_omits_tool_fields() {
        let client = client();
        let messages = vec![Message::user("hi")];
        let body = serde_json::to_value(client.build_request(&messages, Some(&[][..]), true)).unwrap();

        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_parse_tool_call_response() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "a", "type": "function", "function": {"name": "web_browser", "arguments": "{\"action\":\"search\",\"query\":\"rust\"}"}},
                        {"id": "b", "type": "function", "function": {"name": "system_control", "arguments": ""}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let parsed: CompletionResponse = serde_json::from_value(raw).unwrap();
        let response = parsed.into_chat_response().unwrap();

        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].id, "a");
        assert_eq!(response.tool_calls[0].arguments["query"], "rust");
        assert!(response.tool_calls[1].arguments.is_empty());
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_unparseable_arguments_are_an_error() {
        let raw = json!({
            "choices": [{
                "message": {"tool_calls": [{"id": "a", "function": {"name": "x", "arguments": "{oops"}}]}
            }]
        });
        let parsed: CompletionResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            parsed.into_chat_response(),
            Err(LLMError::ParseError(_))
        ));
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let parsed: CompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(parsed.into_chat_response().is_err());
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"hel"}}]}"#),
            SseLine::Fragment("hel".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
    }

    #[tokio::test]
    async fn test_sse_fragments_across_chunk_boundaries() {
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"hel\"}}]}\n\nda".to_vec()),
            Ok(b"ta: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n".to_vec()),
            Ok(b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n".to_vec()),
        ];

        let fragments: Vec<String> = sse_fragments(stream::iter(chunks))
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_final_line_without_newline() {
        let chunks: Vec<reqwest::Result<Vec<u8>>> =
            vec![Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}".to_vec())];

        let fragments: Vec<String> = sse_fragments(stream::iter(chunks))
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["end".to_string()]);
    }
}
