//! Command handlers for CLI operations
//!
//! - run: execute one instruction through the planner
//! - chat: interactive session over the same planner
//! - ask: streamed plain answer without skills
//! - skills: list registered skill descriptors
//! - classify: show the classifier verdict for a command
//!
//! Interactive confirmations are answered on stdin. Chat input and
//! confirmation answers share one line reader so neither steals lines from
//! the other.

use anyhow::{Context, Result};
use futures::StreamExt;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{Planner, RunOutcome, RunReport};
use crate::cli::{ChatInput, CHAT_HELP};
use crate::command_executor::CommandExecutor;
use crate::config::Config;
use crate::confirmation::{ConfirmationGate, ConfirmationRequest};
use crate::llm::openai::OpenAICompatibleClient;
use crate::memory::{self, MemoryStore, SessionContext};
use crate::security_classifier::SecurityClassifier;
use crate::skills::SkillRegistry;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

type InputLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

/// Everything a planner-backed command needs
pub struct Session {
    config: Config,
    planner: Arc<Planner>,
    memory: Arc<dyn MemoryStore>,
    gate: ConfirmationGate,
    input: InputLines,
    approver: Option<JoinHandle<()>>,
}

impl Session {
    /// Build client, registry, memory and planner from configuration
    ///
    /// With `auto_approve` (or `require_confirmation = false`) every
    /// confirmation is granted; otherwise a stdin approver task answers them.
    pub async fn start(config: Config, auto_approve: bool) -> Result<Self> {
        let client = OpenAICompatibleClient::from_config(&config.llm)
            .context("Failed to create reasoning client")?;
        info!(
            provider = %config.llm.provider,
            model = client.model(),
            "Reasoning client ready"
        );

        let classifier = SecurityClassifier::new(&config.security);
        let executor = CommandExecutor::new(classifier, config.security.max_output_chars);
        let registry = SkillRegistry::with_builtin_skills(&config, executor)
            .context("Failed to register skills")?;

        let memory = memory::open_store(&config.memory)
            .await
            .context("Failed to open conversation store")?;
        let context = Arc::new(SessionContext::new(config.core.workspace.clone()));

        let input: InputLines = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));

        let (gate, approver) = if auto_approve || !config.security.require_confirmation {
            warn!("Confirmations are auto-approved for this session");
            (ConfirmationGate::auto_approve(), None)
        } else {
            let (gate, requests) = ConfirmationGate::channel(config.security.confirmation_timeout(), 8);
            let handle = spawn_stdin_approver(requests, input.clone());
            (gate, Some(handle))
        };

        let planner = Planner::new(Arc::new(client), Arc::new(registry), memory.clone(), context)
            .with_agent_config(&config.agent)
            .with_request_timeout(config.llm.request_timeout())
            .with_gate(gate.clone());

        Ok(Self {
            config,
            planner: Arc::new(planner),
            memory,
            gate,
            input,
            approver,
        })
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Run one instruction; Ctrl-C cancels it
    async fn run_cancellable(&self, instruction: &str) -> RunReport {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });

        let report = self.planner.run_with(instruction, &self.gate, cancel).await;
        watcher.abort();
        report
    }

    /// Flush the conversation store; call once the command is done
    pub async fn close(self) -> Result<()> {
        self.memory
            .close()
            .await
            .context("Failed to close conversation store")
    }

    async fn read_line(&self) -> Result<Option<String>> {
        let mut input = self.input.lock().await;
        input.next_line().await.context("Failed to read from stdin")
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(approver) = self.approver.take() {
            approver.abort();
        }
    }
}

/// Answer confirmation requests from `input` (stdin in the CLI), one at a
/// time
///
/// Only `y` or `yes` approves. End of input denies. A request whose
/// requester stops waiting releases `input` without consuming a line, so
/// the next chat instruction is not taken as a late answer.
pub fn spawn_stdin_approver<R>(
    mut requests: mpsc::Receiver<ConfirmationRequest>,
    input: Arc<Mutex<Lines<R>>>,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(mut request) = requests.recv().await {
            if request.is_closed() {
                debug!(id = %request.id(), "Skipping expired confirmation request");
                continue;
            }

            eprintln!();
            eprintln!("⚠ Confirmation required");
            eprintln!("  {}", request.description());
            eprint!("  Allow? [y/N] ");
            std::io::stderr().flush().ok();

            // `next_line` is cancel safe: losing the race drops no input
            let answer = tokio::select! {
                biased;
                _ = request.closed() => None,
                line = async { input.lock().await.next_line().await } => Some(line),
            };

            let Some(answer) = answer else {
                eprintln!("(no answer in time, denied)");
                info!(id = %request.id(), "Confirmation expired before an answer");
                continue;
            };

            let approved = match answer {
                Ok(Some(line)) => is_affirmative(&line),
                Ok(None) => false,
                Err(e) => {
                    warn!("Failed to read confirmation answer: {}", e);
                    false
                }
            };

            info!(id = %request.id(), approved, "Confirmation answered");
            request.respond(approved);
        }
    })
}

/// `y` / `yes`, case-insensitive
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", report.answer);
            if report.outcome != RunOutcome::Answered {
                eprintln!(
                    "  ({:?} after {} iteration(s), {} tool call(s))",
                    report.outcome, report.iterations, report.tool_calls
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

/// Execute one instruction
pub async fn handle_run(instruction: String, session: &Session, format: OutputFormat) -> Result<()> {
    let report = session.run_cancellable(&instruction).await;
    print_report(&report, format)
}

/// Interactive session
pub async fn handle_chat(session: &Session, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Text = format {
        println!("Jarvis is ready. Type /help for commands, exit to leave.");
    }

    loop {
        if let OutputFormat::Text = format {
            print!("\nYou: ");
            std::io::stdout().flush().ok();
        }

        let Some(line) = session.read_line().await? else {
            break;
        };

        match ChatInput::parse(&line) {
            ChatInput::Exit => break,
            ChatInput::Empty => continue,
            ChatInput::Help => println!("{}", CHAT_HELP),
            ChatInput::Clear => {
                session
                    .memory
                    .clear()
                    .await
                    .context("Failed to clear conversation")?;
                println!("Conversation cleared.");
            }
            ChatInput::Skills => print_skills(session.planner.registry(), format)?,
            ChatInput::Status => print_status(session, format)?,
            ChatInput::Unknown(command) => {
                println!("Unknown command: {} (try /help)", command);
            }
            ChatInput::Instruction(instruction) => {
                let report = session.run_cancellable(&instruction).await;
                if let OutputFormat::Text = format {
                    print!("Jarvis: ");
                }
                print_report(&report, format)?;
            }
        }
    }

    if let OutputFormat::Text = format {
        println!("Goodbye.");
    }
    Ok(())
}

/// Stream a plain answer
pub async fn handle_ask(question: String, session: &Session, format: OutputFormat) -> Result<()> {
    let mut stream = session
        .planner
        .stream_respond(&question)
        .await
        .context("Failed to start answer stream")?;

    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(text) => {
                if let OutputFormat::Text = format {
                    print!("{}", text);
                    std::io::stdout().flush().ok();
                }
                answer.push_str(&text);
            }
            Err(e) => {
                warn!("Answer stream failed: {}", e);
                break;
            }
        }
    }

    session.planner.remember_answer(&answer).await;

    match format {
        OutputFormat::Text => println!(),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"question": question, "answer": answer}))?
            );
        }
    }
    Ok(())
}

/// List skills enabled in configuration
pub fn handle_skills(config: &Config, format: OutputFormat) -> Result<()> {
    let executor = CommandExecutor::new(
        SecurityClassifier::new(&config.security),
        config.security.max_output_chars,
    );
    let registry =
        SkillRegistry::with_builtin_skills(config, executor).context("Failed to register skills")?;
    print_skills(&registry, format)
}

fn print_skills(registry: &SkillRegistry, format: OutputFormat) -> Result<()> {
    let descriptors = registry.descriptors();
    match format {
        OutputFormat::Text => {
            if descriptors.is_empty() {
                println!("No skills enabled.");
            }
            for d in &descriptors {
                println!("  {:<16} [{}]", d.name, d.permission_level);
                println!("    {}", d.description);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
        }
    }
    Ok(())
}

fn print_status(session: &Session, format: OutputFormat) -> Result<()> {
    let config = &session.config;
    let model = config
        .llm
        .active()
        .map(|p| p.model.clone())
        .unwrap_or_default();
    let backend = format!("{:?}", config.memory.backend).to_lowercase();

    match format {
        OutputFormat::Text => {
            println!("  {:<16} {}", "Provider:", session.planner.client_name());
            println!("  {:<16} {}", "Model:", model);
            println!("  {:<16} {}", "Memory:", backend);
            println!("  {:<16} {}", "Max iterations:", session.planner.max_iterations());
            println!("  {:<16} {}", "Skills:", session.planner.registry().names().join(", "));
        }
        OutputFormat::Json => {
            let output = json!({
                "provider": session.planner.client_name(),
                "model": model,
                "memory": backend,
                "max_iterations": session.planner.max_iterations(),
                "skills": session.planner.registry().names(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Print the classifier verdict for a command
pub fn handle_classify(command: String, config: &Config, format: OutputFormat) -> Result<()> {
    let classifier = SecurityClassifier::new(&config.security);
    let verdict = classifier.classify_command(&command);
    let matched = classifier.forbidden_match(&command);

    match format {
        OutputFormat::Text => {
            println!("{}: {}", verdict, command);
            if let Some(pattern) = matched {
                println!("  matches forbidden operation '{}'", pattern);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "command": command,
                "verdict": verdict,
                "forbidden_match": matched,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
