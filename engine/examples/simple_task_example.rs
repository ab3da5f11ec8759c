//! Example demonstrating a single planner run with a scripted approver
//!
//! This example shows how to:
//! - Build the reasoning client, skill registry and memory from configuration
//! - Serve the confirmation gate from code instead of a terminal prompt
//! - Inspect the run report
//!
//! Prerequisites:
//! - A configured provider (e.g. `DEEPSEEK_API_KEY` set, or Ollama running
//!   with `provider = "ollama"` in `~/.jarvis/config.toml`)

use jarvis_engine::{
    agent::Planner,
    command_executor::CommandExecutor,
    config::Config,
    confirmation::ConfirmationGate,
    llm::openai::OpenAICompatibleClient,
    memory::{open_store, SessionContext},
    security_classifier::SecurityClassifier,
    skills::SkillRegistry,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Simple Task Example ===\n");

    let config = Config::load_or_create()?;
    let client = OpenAICompatibleClient::from_config(&config.llm)?;
    println!("✓ Reasoning client: {} ({})", config.llm.provider, client.model());

    let classifier = SecurityClassifier::new(&config.security);
    let executor = CommandExecutor::new(classifier, config.security.max_output_chars);
    let registry = SkillRegistry::with_builtin_skills(&config, executor)?;
    println!("✓ Skills: {}", registry.names().join(", "));

    let memory = open_store(&config.memory).await?;
    let context = Arc::new(SessionContext::new(config.core.workspace.clone()));

    // Approve anything that only lists or reads, deny the rest
    let (gate, mut requests) = ConfirmationGate::channel(Duration::from_secs(30), 4);
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let text = request.description().to_lowercase();
            let approved = text.contains("list") || text.contains("read");
            println!("? {} -> {}", request.description(), if approved { "approved" } else { "denied" });
            request.respond(approved);
        }
    });

    let planner = Planner::new(Arc::new(client), Arc::new(registry), memory, context)
        .with_agent_config(&config.agent)
        .with_gate(gate);

    let instruction = "List the files in my workspace and tell me which one is largest";
    println!("\n> {}\n", instruction);

    let report = planner.run_detailed(instruction).await;

    println!("{}\n", report.answer);
    println!(
        "outcome: {:?}, reasoning calls: {}, tool calls: {}",
        report.outcome, report.iterations, report.tool_calls
    );

    Ok(())
}
