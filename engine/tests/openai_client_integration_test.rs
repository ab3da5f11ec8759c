//! Integration tests for the OpenAI-compatible reasoning client
//!
//! Runs the client against a wiremock server:
//! - request shape (tools, tool_choice, bearer auth)
//! - tool-call responses and status mapping
//! - SSE streaming
//! - a full planner run over HTTP

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

use jarvis_engine::agent::{Planner, RunOutcome};
use jarvis_engine::llm::openai::OpenAICompatibleClient;
use jarvis_engine::llm::{LLMError, Message, ReasoningClient};
use jarvis_engine::memory::{InMemoryStore, SessionContext};
use jarvis_engine::skills::{SkillRegistry, SystemControlSkill};
use jarvis_engine::security_classifier::SecurityClassifier;
use sdk::{PermissionLevel, SkillDescriptor};

fn client(server: &MockServer) -> OpenAICompatibleClient {
    OpenAICompatibleClient::new(
        "deepseek",
        server.uri(),
        "deepseek-chat",
        "sk-test",
        Duration::from_secs(5),
    )
    .unwrap()
}

fn completion(message: serde_json::Value, finish_reason: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}]
    })
}

#[tokio::test]
async fn test_request_carries_tools_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "deepseek-chat",
            "tool_choice": "auto",
            "tools": [{
                "type": "function",
                "function": {
                    "name": "lookup",
                    "parameters": {"type": "object", "required": ["x"]}
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({"role": "assistant", "content": "hi"}),
            "stop",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let tools = vec![SkillDescriptor::new("lookup", "Lookup", PermissionLevel::ReadOnly)
        .with_param("x", json!({"type": "string"}), true)
        .to_tool_schema()];

    let response = client(&server)
        .chat(&[Message::user("hello")], Some(tools.as_slice()))
        .await
        .unwrap();

    assert_eq!(response.content, "hi");
    assert!(!response.has_tool_calls());
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_tool_call_response_is_parsed_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_a", "type": "function",
                     "function": {"name": "terminal", "arguments": "{\"action\":\"run_command\",\"command\":\"ls\"}"}},
                    {"id": "call_b", "type": "function",
                     "function": {"name": "web_browser", "arguments": "{\"action\":\"search\",\"query\":\"rust\"}"}}
                ]
            }),
            "tool_calls",
        )))
        .mount(&server)
        .await;

    let response = client(&server)
        .chat(&[Message::user("do two things")], None)
        .await
        .unwrap();

    assert_eq!(response.content, "");
    let ids: Vec<&str> = response.tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["call_a", "call_b"]);
    assert_eq!(response.tool_calls[0].arguments["command"], "ls");
    assert_eq!(response.tool_calls[1].name, "web_browser");
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client(&server);
    let messages = [Message::user("x")];

    assert!(matches!(
        client.chat(&messages, None).await,
        Err(LLMError::AuthenticationFailed(_))
    ));
    assert!(matches!(
        client.chat(&messages, None).await,
        Err(LLMError::RateLimitExceeded)
    ));
    match client.chat(&messages, None).await {
        Err(LLMError::InvalidRequest(text)) => assert!(text.contains("boom")),
        other => panic!("expected InvalidRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_provider() {
    let client = OpenAICompatibleClient::new(
        "ollama",
        "http://127.0.0.1:1",
        "llama3",
        "ollama",
        Duration::from_secs(2),
    )
    .unwrap();

    let err = client.chat(&[Message::user("x")], None).await.unwrap_err();
    assert!(matches!(
        err,
        LLMError::ProviderUnavailable(_) | LLMError::NetworkError(_)
    ));
}

#[tokio::test]
async fn test_stream_yields_fragments_until_done() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let stream = client(&server)
        .chat_stream(&[Message::user("greet me")])
        .await
        .unwrap();
    let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

    assert_eq!(fragments.concat(), "Hello");
}

#[tokio::test]
async fn test_planner_round_trip_over_http() {
    let server = MockServer::start().await;

    // First call: ask for system info
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({
                "role": "assistant",
                "content": "",
                "tool_calls": [{"id": "call_1", "type": "function",
                    "function": {"name": "system_control", "arguments": "{\"action\":\"system_info\"}"}}]
            }),
            "tool_calls",
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // Second call must carry the tool result keyed by the call id
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(|request: &Request| {
            let body: serde_json::Value = match serde_json::from_slice(&request.body) {
                Ok(body) => body,
                Err(_) => return false,
            };
            let messages = body["messages"].as_array().cloned().unwrap_or_default();
            let n = messages.len();
            n >= 2
                && messages[n - 2]["tool_calls"][0]["function"]["arguments"]
                    .as_str()
                    .is_some_and(|a| a.contains("system_info"))
                && messages[n - 1]["role"] == "tool"
                && messages[n - 1]["tool_call_id"] == "call_1"
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({"role": "assistant", "content": "You are on a computer."}),
            "stop",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut registry = SkillRegistry::new(Duration::from_secs(5));
    registry.register(
        "system_control",
        Arc::new(SystemControlSkill::new(SecurityClassifier::from_lists(
            vec![],
            vec![],
            vec![],
            vec![],
        ))),
    );

    let planner = Planner::new(
        Arc::new(client(&server)),
        Arc::new(registry),
        Arc::new(InMemoryStore::new(10)),
        Arc::new(SessionContext::new(std::env::temp_dir())),
    );

    let report = planner.run_detailed("what machine is this?").await;
    assert_eq!(report.outcome, RunOutcome::Answered);
    assert_eq!(report.answer, "You are on a computer.");
    assert_eq!(report.iterations, 2);
}
