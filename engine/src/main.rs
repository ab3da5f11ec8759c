// Jarvis natural-language assistant
// Main entry point for the jarvis binary

use anyhow::Context;
use clap::Parser;
use jarvis_engine::cli::{Cli, Command};
use jarvis_engine::config::Config;
use jarvis_engine::handlers::{
    handle_ask, handle_chat, handle_classify, handle_run, handle_skills, OutputFormat, Session,
};
use jarvis_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::load_or_create().context("Failed to load config")?
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!(
        "Jarvis v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Command::Run { instruction } => {
            let session = Session::start(config, cli.yes).await?;
            let outcome = handle_run(instruction.join(" "), &session, format).await;
            session.close().await?;
            outcome
        }

        Command::Chat => {
            let session = Session::start(config, cli.yes).await?;
            let outcome = handle_chat(&session, format).await;
            session.close().await?;
            outcome
        }

        Command::Ask { question } => {
            let session = Session::start(config, cli.yes).await?;
            let outcome = handle_ask(question.join(" "), &session, format).await;
            session.close().await?;
            outcome
        }

        Command::Skills => handle_skills(&config, format),

        Command::Classify { command } => handle_classify(command.join(" "), &config, format),
    }
}
