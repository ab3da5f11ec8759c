//! Planner
//!
//! Drives one instruction through the reason-act-observe loop:
//!
//! 1. Record the instruction in the conversation store
//! 2. Build the system prompt: persona, session context, available skills
//! 3. Ask the reasoning client what to do next, offering every skill schema
//! 4. Plain content ends the run; tool calls are dispatched in order and
//!    each result is appended as a tool message keyed by the call id
//! 5. Stop after `max_iterations` reasoning calls with a fixed message
//! 6. Record the final answer
//!
//! Skill and confirmation failures are fed back into the transcript so the
//! reasoning step can react. Only a reasoning-client failure, the iteration
//! cap, or cancellation end a run early, each with a fixed user-facing text.
//!
//! A `Planner` keeps no per-request state, so one instance can serve many
//! concurrent runs.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sdk::errors::EngineError;

use crate::config::AgentConfig;
use crate::confirmation::ConfirmationGate;
use crate::llm::{ChatResponse, Message, MessageRole, ReasoningClient, TextStream};
use crate::memory::{ContextManager, MemoryStore};
use crate::skills::SkillRegistry;

/// Answer when the reasoning client fails
pub const REASONING_FAILURE_TEXT: &str =
    "Sorry, I ran into a problem while processing your request. Please try again.";

/// Answer when the iteration cap is reached
pub const ITERATION_LIMIT_TEXT: &str =
    "Sorry, this task is too complex to finish within the allowed number of steps.";

/// Answer when the run is cancelled
pub const CANCELLED_TEXT: &str = "Task cancelled.";

const DEFAULT_MAX_ITERATIONS: usize = 10;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_PERSONA: &str = "You are Jarvis, a personal assistant running on the user's computer. \
Carry out the user's instructions with the skills listed below and report what you did in plain language. \
When a skill call fails, read the error and decide whether to retry with different arguments, try another approach, or explain the problem. \
Never try to work around a refused or denied action. \
Answer in the language the user writes in.";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The reasoning step returned plain content
    Answered,
    /// `max_iterations` reasoning calls all requested tools
    IterationLimit,
    /// The reasoning client failed or timed out
    ReasoningFailed,
    /// The cancellation token fired
    Cancelled,
}

/// Result of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub answer: String,
    pub outcome: RunOutcome,
    /// Reasoning calls made
    pub iterations: usize,
    /// Tool calls dispatched
    pub tool_calls: usize,
}

impl RunReport {
    fn new(answer: impl Into<String>, outcome: RunOutcome, iterations: usize, tool_calls: usize) -> Self {
        Self {
            answer: answer.into(),
            outcome,
            iterations,
            tool_calls,
        }
    }
}

/// The reason-act-observe loop
pub struct Planner {
    client: Arc<dyn ReasoningClient>,
    registry: Arc<SkillRegistry>,
    memory: Arc<dyn MemoryStore>,
    context: Arc<dyn ContextManager>,
    gate: ConfirmationGate,
    persona: String,
    max_iterations: usize,
    request_timeout: Duration,
}

impl Planner {
    /// Create a planner with default limits
    ///
    /// Confirmations are denied until a gate is supplied through
    /// [`Planner::with_gate`] or per run through [`Planner::run_with`].
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        registry: Arc<SkillRegistry>,
        memory: Arc<dyn MemoryStore>,
        context: Arc<dyn ContextManager>,
    ) -> Self {
        Self {
            client,
            registry,
            memory,
            context,
            gate: ConfirmationGate::deny_all(),
            persona: DEFAULT_PERSONA.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Apply iteration cap and persona from configuration
    pub fn with_agent_config(mut self, config: &AgentConfig) -> Self {
        self.max_iterations = config.max_iterations.max(1);
        if let Some(persona) = config.persona.as_deref().filter(|p| !p.trim().is_empty()) {
            self.persona = persona.to_string();
        }
        self
    }

    pub fn with_gate(mut self, gate: ConfirmationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Upper bound on a single reasoning call
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Run one instruction and return the final answer
    pub async fn run(&self, instruction: &str) -> String {
        self.run_detailed(instruction).await.answer
    }

    /// Run one instruction with the planner's own gate and no cancellation
    pub async fn run_detailed(&self, instruction: &str) -> RunReport {
        self.run_with(instruction, &self.gate, CancellationToken::new())
            .await
    }

    /// Run one instruction with a per-request gate and cancellation token
    pub async fn run_with(
        &self,
        instruction: &str,
        gate: &ConfirmationGate,
        cancel: CancellationToken,
    ) -> RunReport {
        let request_id = Uuid::new_v4();
        info!(%request_id, "Starting request: {}", instruction);

        self.remember(MessageRole::User, instruction).await;
        self.context.set_current_task(instruction);

        let report = self.react(request_id, instruction, gate, &cancel).await;

        self.context.clear_current_task();
        self.remember(MessageRole::Assistant, &report.answer).await;

        info!(
            %request_id,
            outcome = ?report.outcome,
            iterations = report.iterations,
            tool_calls = report.tool_calls,
            "Request finished"
        );
        report
    }

    async fn react(
        &self,
        request_id: Uuid,
        instruction: &str,
        gate: &ConfirmationGate,
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut transcript = self.transcript(instruction).await;
        let tools = self.registry.tool_schemas();
        let tools = (!tools.is_empty()).then_some(tools.as_slice());
        let mut dispatched = 0;

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                warn!(%request_id, iteration, "Request cancelled");
                return RunReport::new(CANCELLED_TEXT, RunOutcome::Cancelled, iteration - 1, dispatched);
            }

            debug!(%request_id, "Iteration {}/{}", iteration, self.max_iterations);

            let response = match self.reason(&transcript, tools, cancel).await {
                Ok(response) => response,
                Err(EngineError::Cancelled) => {
                    warn!(%request_id, iteration, "Request cancelled during reasoning");
                    return RunReport::new(CANCELLED_TEXT, RunOutcome::Cancelled, iteration, dispatched);
                }
                Err(e) => {
                    error!(%request_id, iteration, error = %e, "Reasoning call failed");
                    return RunReport::new(
                        REASONING_FAILURE_TEXT,
                        RunOutcome::ReasoningFailed,
                        iteration,
                        dispatched,
                    );
                }
            };

            if !response.has_tool_calls() {
                debug!(%request_id, iteration, "Final answer received");
                return RunReport::new(response.content, RunOutcome::Answered, iteration, dispatched);
            }

            let ChatResponse {
                content, tool_calls, ..
            } = response;

            debug!(%request_id, iteration, count = tool_calls.len(), "Dispatching tool calls");
            transcript.push(Message::assistant_with_tools(content, tool_calls.clone()));

            for call in &tool_calls {
                let result = self.registry.dispatch(call, gate, cancel).await;
                dispatched += 1;
                transcript.push(Message::tool_result(result.to_message_content(), call.id.clone()));
            }
        }

        warn!(
            %request_id,
            max_iterations = self.max_iterations,
            error = %EngineError::IterationLimitExceeded(self.max_iterations),
            "Giving up on request"
        );
        RunReport::new(
            ITERATION_LIMIT_TEXT,
            RunOutcome::IterationLimit,
            self.max_iterations,
            dispatched,
        )
    }

    /// One bounded, cancellable reasoning call
    async fn reason(
        &self,
        transcript: &[Message],
        tools: Option<&[sdk::ToolSchema]>,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, EngineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            reply = tokio::time::timeout(self.request_timeout, self.client.chat(transcript, tools)) => {
                match reply {
                    Ok(result) => result.map_err(EngineError::from),
                    Err(_) => Err(EngineError::Reasoning(format!(
                        "no response within {}s",
                        self.request_timeout.as_secs()
                    ))),
                }
            }
        }
    }

    /// Answer without tools, for plain conversational turns
    pub async fn simple_respond(&self, instruction: &str) -> String {
        self.remember(MessageRole::User, instruction).await;
        let transcript = self.transcript(instruction).await;

        let answer = match tokio::time::timeout(
            self.request_timeout,
            self.client.chat(&transcript, None),
        )
        .await
        {
            Ok(Ok(response)) => response.content,
            Ok(Err(e)) => {
                error!(error = %e, "Reasoning call failed");
                REASONING_FAILURE_TEXT.to_string()
            }
            Err(_) => {
                error!("Reasoning call timed out after {}s", self.request_timeout.as_secs());
                REASONING_FAILURE_TEXT.to_string()
            }
        };

        self.remember(MessageRole::Assistant, &answer).await;
        answer
    }

    /// Stream a plain answer
    ///
    /// The instruction is recorded immediately; the caller records the
    /// assembled answer with [`Planner::remember_answer`] once the stream
    /// is drained.
    pub async fn stream_respond(&self, instruction: &str) -> Result<TextStream, EngineError> {
        self.remember(MessageRole::User, instruction).await;
        let transcript = self.transcript(instruction).await;

        match tokio::time::timeout(self.request_timeout, self.client.chat_stream(&transcript)).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::Reasoning(format!(
                "no response within {}s",
                self.request_timeout.as_secs()
            ))),
        }
    }

    /// Record an answer produced outside `run`
    pub async fn remember_answer(&self, answer: &str) {
        self.remember(MessageRole::Assistant, answer).await;
    }

    /// Persona, session context and skill list
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "{}\n\n## Current context\n{}",
            self.persona,
            self.context.context_summary()
        );
        if !self.registry.is_empty() {
            prompt.push_str("\n\n## Available skills\n");
            prompt.push_str(&self.registry.describe());
        }
        prompt
    }

    /// System prompt followed by recent history ending in `instruction`
    async fn transcript(&self, instruction: &str) -> Vec<Message> {
        let history = match self.memory.recent_context().await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to load conversation history");
                Vec::new()
            }
        };

        let mut transcript = Vec::with_capacity(history.len() + 2);
        transcript.push(Message::system(self.system_prompt()));
        transcript.extend(history.into_iter().filter(|m| m.role != MessageRole::System));

        // The store may have dropped the instruction if the write failed
        let ends_with_instruction = transcript
            .last()
            .is_some_and(|m| m.role == MessageRole::User && m.content == instruction);
        if !ends_with_instruction {
            transcript.push(Message::user(instruction));
        }
        transcript
    }

    async fn remember(&self, role: MessageRole, content: &str) {
        if let Err(e) = self.memory.add_message(role, content).await {
            warn!(%role, error = %e, "Failed to record message");
        }
    }
}
