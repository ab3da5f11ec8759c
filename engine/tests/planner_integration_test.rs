//! Integration tests for the planner loop
//!
//! Drives the planner with scripted reasoning clients against the real
//! registry, classifier, executor and confirmation gate:
//! - iteration cap and fixed fallback texts
//! - tool results stitched back in call order
//! - forbidden commands never spawn, even when approved
//! - denial and unknown skills are fed back and the loop continues
//! - cancellation kills a running command

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use jarvis_engine::agent::{
    Planner, RunOutcome, CANCELLED_TEXT, ITERATION_LIMIT_TEXT, REASONING_FAILURE_TEXT,
};
use jarvis_engine::command_executor::CommandExecutor;
use jarvis_engine::config::Config;
use jarvis_engine::confirmation::ConfirmationGate;
use jarvis_engine::llm::{self, ChatResponse, LLMError, Message, MessageRole, ReasoningClient, ToolCall};
use jarvis_engine::memory::{InMemoryStore, MemoryStore, SessionContext};
use jarvis_engine::security_classifier::SecurityClassifier;
use jarvis_engine::skills::SkillRegistry;
use sdk::types::{Params, PermissionLevel, SkillDescriptor, SkillResult};
use sdk::{Skill, ToolSchema};

/// Replays queued responses, then repeats `fallback` (or fails) forever
struct ScriptedClient {
    replies: Mutex<VecDeque<ChatResponse>>,
    fallback: Option<ChatResponse>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    fn new(replies: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn repeating(reply: ChatResponse) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn transcript(&self, n: usize) -> Vec<Message> {
        self.seen.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolSchema]>,
    ) -> llm::Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or_else(|| LLMError::ProviderUnavailable("connection refused".into()))
    }
}

fn args(value: Value) -> Params {
    value.as_object().cloned().unwrap()
}

fn tool_call(id: &str, name: &str, arguments: Value) -> ChatResponse {
    ChatResponse::with_tool_calls("", vec![ToolCall::new(id, name, args(arguments))])
}

struct Fixture {
    temp: TempDir,
    executor: CommandExecutor,
    registry: Arc<SkillRegistry>,
}

impl Fixture {
    fn new() -> Self {
        Self::with(|_| {})
    }

    fn with(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.core.workspace = temp.path().to_path_buf();
        config.security.allowed_directories = vec![temp.path().to_path_buf()];
        config.security.forbidden_directories = vec![temp.path().join("private")];
        config.agent.skill_timeout_secs = 10;
        adjust(&mut config);

        let executor = CommandExecutor::new(
            SecurityClassifier::new(&config.security),
            config.security.max_output_chars,
        );
        let registry = SkillRegistry::with_builtin_skills(&config, executor.clone()).unwrap();

        Self {
            temp,
            executor,
            registry: Arc::new(registry),
        }
    }

    fn planner(&self, client: Arc<ScriptedClient>) -> Planner {
        Planner::new(
            client,
            self.registry.clone(),
            Arc::new(InMemoryStore::new(40)),
            Arc::new(SessionContext::new(self.temp.path().to_path_buf())),
        )
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }
}

fn tool_messages(transcript: &[Message]) -> Vec<&Message> {
    transcript
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .collect()
}

// Scenario A: a SAFE_WRITE call on an allowed path runs without a prompt
#[tokio::test]
async fn test_safe_call_runs_without_confirmation() {
    let fx = Fixture::new();
    std::fs::write(fx.path("notes.txt"), "buy milk").unwrap();

    let client = ScriptedClient::new(vec![
        tool_call("c1", "file_manager", json!({"action": "read_file", "path": "notes.txt"})),
        ChatResponse::text("Your note says: buy milk"),
    ]);
    let (gate, mut prompts) = ConfirmationGate::channel(Duration::from_secs(1), 4);

    let report = fx
        .planner(client.clone())
        .run_with("read my notes", &gate, CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Answered);
    assert_eq!(report.answer, "Your note says: buy milk");
    assert_eq!(report.iterations, 2);
    assert!(prompts.try_recv().is_err());

    let second = client.transcript(1);
    let tools = tool_messages(&second);
    assert_eq!(tools.len(), 1);
    assert!(tools[0].content.contains("buy milk"));
}

// Scenario B: a forbidden command is refused without prompting or spawning
#[tokio::test]
async fn test_forbidden_command_never_prompts_or_spawns() {
    let fx = Fixture::new();
    let client = ScriptedClient::new(vec![
        tool_call("c1", "terminal", json!({"action": "run_command", "command": "format C:"})),
        ChatResponse::text("I won't do that."),
    ]);
    let (gate, mut prompts) = ConfirmationGate::channel(Duration::from_secs(1), 4);

    let report = fx
        .planner(client.clone())
        .run_with("wipe my disk", &gate, CancellationToken::new())
        .await;

    assert_eq!(report.outcome, RunOutcome::Answered);
    assert!(prompts.try_recv().is_err());
    assert_eq!(fx.executor.spawn_count(), 0);

    let result: Value = serde_json::from_str(&tool_messages(&client.transcript(1))[0].content).unwrap();
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().contains("rejected"));
}

#[tokio::test]
async fn test_forbidden_command_refused_even_when_approved() {
    let fx = Fixture::new();
    let target = fx.path("x");
    std::fs::create_dir_all(&target).unwrap();

    let client = ScriptedClient::new(vec![
        tool_call(
            "c1",
            "terminal",
            json!({"action": "run_command", "command": format!("rm -rf {}", target.display())}),
        ),
        ChatResponse::text("done"),
    ]);

    fx.planner(client)
        .run_with("clean up", &ConfirmationGate::auto_approve(), CancellationToken::new())
        .await;

    assert_eq!(fx.executor.spawn_count(), 0);
    assert!(target.exists());
}

// Scenario C: a model that never stops requesting tools hits the cap
#[tokio::test]
async fn test_iteration_cap() {
    let fx = Fixture::new();
    let client = ScriptedClient::repeating(tool_call("loop", "no_such_skill", json!({})));

    let report = fx.planner(client.clone()).run_detailed("go forever").await;

    assert_eq!(report.outcome, RunOutcome::IterationLimit);
    assert_eq!(report.answer, ITERATION_LIMIT_TEXT);
    assert_eq!(report.iterations, 10);
    assert_eq!(report.tool_calls, 10);
    assert_eq!(client.calls(), 10);
}

#[tokio::test]
async fn test_configured_cap_is_respected() {
    let fx = Fixture::new();
    let client = ScriptedClient::repeating(tool_call("loop", "no_such_skill", json!({})));

    let report = fx
        .planner(client.clone())
        .with_max_iterations(3)
        .run_detailed("go forever")
        .await;

    assert_eq!(report.iterations, 3);
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn test_batch_results_follow_call_order() {
    let fx = Fixture::new();
    std::fs::write(fx.path("a.txt"), "A").unwrap();

    let batch = ChatResponse::with_tool_calls(
        "Let me check a few things.",
        vec![
            ToolCall::new("c1", "file_manager", args(json!({"action": "file_exists", "path": "a.txt"}))),
            ToolCall::new("c2", "teleport", args(json!({}))),
            ToolCall::new("c3", "file_manager", args(json!({"action": "read_file", "path": "a.txt"}))),
        ],
    );
    let client = ScriptedClient::new(vec![batch, ChatResponse::text("All checked.")]);

    let report = fx.planner(client.clone()).run_detailed("check").await;
    assert_eq!(report.tool_calls, 3);

    let transcript = client.transcript(1);
    let assistant_at = transcript
        .iter()
        .position(|m| m.tool_calls.is_some())
        .unwrap();
    let assistant = &transcript[assistant_at];
    assert_eq!(assistant.content, "Let me check a few things.");
    assert_eq!(assistant.tool_calls.as_ref().unwrap().len(), 3);

    let ids: Vec<&str> = transcript[assistant_at + 1..]
        .iter()
        .map(|m| m.tool_call_id.as_deref().unwrap())
        .collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert!(transcript[assistant_at + 2].content.contains("unknown skill: teleport"));
}

#[tokio::test]
async fn test_denial_is_fed_back_and_loop_continues() {
    let fx = Fixture::new();
    let client = ScriptedClient::new(vec![
        tool_call("c1", "terminal", json!({"action": "run_command", "command": "touch created.txt"})),
        ChatResponse::text("Okay, I left it alone."),
    ]);

    let (gate, mut prompts) = ConfirmationGate::channel(Duration::from_secs(5), 4);
    let approver = tokio::spawn(async move {
        let mut asked = 0;
        while let Some(request) = prompts.recv().await {
            assert!(request.description().contains("terminal"));
            asked += 1;
            request.deny();
        }
        asked
    });

    let planner = fx.planner(client.clone());
    let report = planner
        .run_with("create a file", &gate, CancellationToken::new())
        .await;
    drop(planner);
    drop(gate);

    assert_eq!(report.answer, "Okay, I left it alone.");
    assert_eq!(client.calls(), 2);
    assert!(!fx.path("created.txt").exists());
    assert_eq!(fx.executor.spawn_count(), 0);

    let transcript = client.transcript(1);
    let tool = &tool_messages(&transcript)[0].content;
    assert!(tool.contains("user denied execution"));
    assert_eq!(approver.await.unwrap(), 1);
}

#[tokio::test]
async fn test_confirmation_timeout_denies() {
    let fx = Fixture::new();
    let client = ScriptedClient::new(vec![
        tool_call("c1", "file_manager", json!({"action": "delete_file", "path": "keep.txt"})),
        ChatResponse::text("Not deleted."),
    ]);
    std::fs::write(fx.path("keep.txt"), "x").unwrap();

    // Nobody answers
    let (gate, _prompts) = ConfirmationGate::channel(Duration::from_millis(100), 4);
    fx.planner(client.clone())
        .run_with("delete keep.txt", &gate, CancellationToken::new())
        .await;

    assert!(fx.path("keep.txt").exists());
    let transcript = client.transcript(1);
    let tool = &tool_messages(&transcript)[0].content;
    assert!(tool.contains("confirmation timed out"));
}

#[tokio::test]
async fn test_chained_or_wrapped_commands_still_need_confirmation() {
    for template in ["ls & touch {}", "time touch {}", "env touch {}"] {
        let fx = Fixture::new();
        let marker = fx.path("chained.txt");
        let command = template.replace("{}", &marker.display().to_string());
        let client = ScriptedClient::new(vec![
            tool_call("c1", "terminal", json!({"action": "run_command", "command": command})),
            ChatResponse::text("Nothing ran."),
        ]);

        // Nobody answers
        let (gate, mut prompts) = ConfirmationGate::channel(Duration::from_millis(100), 4);
        fx.planner(client.clone())
            .run_with("list files", &gate, CancellationToken::new())
            .await;

        assert!(prompts.try_recv().is_ok(), "{} ran without a prompt", command);
        assert_eq!(fx.executor.spawn_count(), 0);
        assert!(!marker.exists());
        let transcript = client.transcript(1);
        let tool = &tool_messages(&transcript)[0].content;
        assert!(tool.contains("confirmation timed out"));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_open_app_with_a_path_needs_confirmation() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let marker = fx.path("launched.txt");
    let script = fx.path("payload.sh");
    std::fs::write(&script, format!("#!/bin/sh\ntouch {}\n", marker.display())).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let client = ScriptedClient::new(vec![
        tool_call(
            "c1",
            "system_control",
            json!({"action": "open_app", "app_name": script.display().to_string()}),
        ),
        ChatResponse::text("Not opened."),
    ]);

    let (gate, mut prompts) = ConfirmationGate::channel(Duration::from_millis(100), 4);
    fx.planner(client.clone())
        .run_with("open my script", &gate, CancellationToken::new())
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(prompts.try_recv().is_ok());
    assert!(!marker.exists());
    let transcript = client.transcript(1);
    let tool = &tool_messages(&transcript)[0].content;
    assert!(tool.contains("confirmation timed out"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_allow_listed_app_launches_without_prompt() {
    let fx = Fixture::with(|config| config.security.safe_apps = vec!["true".to_string()]);
    let client = ScriptedClient::new(vec![
        tool_call("c1", "system_control", json!({"action": "open_app", "app_name": "true"})),
        ChatResponse::text("Opened."),
    ]);

    let (gate, mut prompts) = ConfirmationGate::channel(Duration::from_millis(100), 4);
    let report = fx
        .planner(client.clone())
        .run_with("open true", &gate, CancellationToken::new())
        .await;

    assert_eq!(report.answer, "Opened.");
    assert!(prompts.try_recv().is_err());
    let transcript = client.transcript(1);
    let tool = &tool_messages(&transcript)[0].content;
    assert!(tool.contains("\"launched\":true"));
}

#[tokio::test]
async fn test_protected_path_is_refused_without_prompt() {
    let fx = Fixture::new();
    let client = ScriptedClient::new(vec![
        tool_call(
            "c1",
            "file_manager",
            json!({"action": "write_file", "path": "private/key.pem", "content": "x"}),
        ),
        ChatResponse::text("Refused."),
    ]);
    let (gate, mut prompts) = ConfirmationGate::channel(Duration::from_secs(1), 4);

    fx.planner(client.clone())
        .run_with("write a key", &gate, CancellationToken::new())
        .await;

    assert!(prompts.try_recv().is_err());
    assert!(!fx.path("private/key.pem").exists());
    assert!(tool_messages(&client.transcript(1))[0].content.contains("path rejected"));
}

/// READ_ONLY skill that vetoes commands through the classifier
struct Inspect {
    classifier: SecurityClassifier,
}

#[async_trait]
impl Skill for Inspect {
    fn descriptor(&self) -> SkillDescriptor {
        SkillDescriptor::new("inspect", "Describe a command", PermissionLevel::ReadOnly)
            .with_param("command", json!({"type": "string"}), true)
    }

    async fn execute(&self, _params: &Params) -> SkillResult {
        SkillResult::success("inspected")
    }

    fn forbidden_reason(&self, params: &Params) -> Option<String> {
        let command = params.get("command")?.as_str()?;
        self.classifier
            .forbidden_match(command)
            .map(|m| format!("command rejected: contains forbidden operation '{}'", m))
    }
}

#[tokio::test]
async fn test_read_only_skill_with_forbidden_command_is_blocked_silently() {
    let classifier = SecurityClassifier::from_lists(vec!["shutdown".into()], vec![], vec![], vec![]);
    let mut registry = SkillRegistry::new(Duration::from_secs(5));
    registry.register("inspect", Arc::new(Inspect { classifier }));

    let client = ScriptedClient::new(vec![
        tool_call("c1", "inspect", json!({"command": "shutdown -h now"})),
        ChatResponse::text("blocked"),
    ]);
    let planner = Planner::new(
        client.clone(),
        Arc::new(registry),
        Arc::new(InMemoryStore::new(10)),
        Arc::new(SessionContext::new(PathBuf::from("/"))),
    );
    let (gate, mut prompts) = ConfirmationGate::channel(Duration::from_secs(1), 4);

    planner
        .run_with("inspect shutdown", &gate, CancellationToken::new())
        .await;

    assert!(prompts.try_recv().is_err());
    assert!(tool_messages(&client.transcript(1))[0].content.contains("rejected"));
}

#[tokio::test]
async fn test_reasoning_failure_ends_run_and_is_remembered() {
    let fx = Fixture::new();
    let client = ScriptedClient::new(vec![]);
    let memory = Arc::new(InMemoryStore::new(10));
    let planner = Planner::new(
        client.clone(),
        fx.registry.clone(),
        memory.clone(),
        Arc::new(SessionContext::new(fx.temp.path().to_path_buf())),
    );

    let report = planner.run_detailed("hello?").await;

    assert_eq!(report.outcome, RunOutcome::ReasoningFailed);
    assert_eq!(report.answer, REASONING_FAILURE_TEXT);
    assert_eq!(client.calls(), 1);

    let stored = memory.recent_context().await.unwrap();
    assert_eq!(stored.last().unwrap().content, REASONING_FAILURE_TEXT);
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancellation_kills_running_command() {
    let fx = Fixture::new();
    let marker = fx.path("finished");
    let command = format!("sleep 1 && touch {}", marker.display());

    let client = ScriptedClient::new(vec![
        tool_call("c1", "terminal", json!({"action": "run_command", "command": command})),
        ChatResponse::text("unreachable"),
    ]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = fx
        .planner(client.clone())
        .run_with("slow thing", &ConfirmationGate::auto_approve(), cancel)
        .await;

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.answer, CANCELLED_TEXT);
    assert_eq!(client.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(fx.executor.spawn_count(), 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!Path::new(&marker).exists());
}

#[tokio::test]
async fn test_concurrent_runs_share_one_planner() {
    let fx = Fixture::new();
    let client = ScriptedClient::repeating(ChatResponse::text("ok"));
    let planner = Arc::new(fx.planner(client.clone()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let planner = planner.clone();
            tokio::spawn(async move { planner.run(&format!("request {}", i)).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), "ok");
    }
    assert_eq!(client.calls(), 4);
}
