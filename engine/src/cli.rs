//! CLI interface for Jarvis
//!
//! Command-line definitions using clap's derive API. Handlers live in
//! `handlers`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Jarvis natural-language assistant
///
/// Turns instructions into terminal commands, file operations and web
/// lookups chosen by a reasoning model. Risky actions ask for confirmation;
/// forbidden ones are always refused.
#[derive(Parser, Debug)]
#[command(name = "jarvis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Approve every confirmation prompt (forbidden actions are still refused)
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute one instruction
    Run {
        /// The instruction, in natural language
        #[arg(required = true, num_args = 1..)]
        instruction: Vec<String>,
    },

    /// Start an interactive session
    Chat,

    /// Ask a question and stream a plain answer (no skills)
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// List available skills
    Skills,

    /// Show how the security classifier rates a command
    Classify {
        /// The command line to classify
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}

/// Commands understood inside `jarvis chat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Exit,
    Help,
    Clear,
    Skills,
    Status,
    Empty,
    /// Slash command nobody recognises
    Unknown(String),
    Instruction(String),
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => Self::Empty,
            "exit" | "quit" | "/exit" | "/quit" => Self::Exit,
            "/help" => Self::Help,
            "/clear" => Self::Clear,
            "/skills" => Self::Skills,
            "/status" => Self::Status,
            other if other.starts_with('/') => Self::Unknown(line.to_string()),
            _ => Self::Instruction(line.to_string()),
        }
    }
}

pub const CHAT_HELP: &str = "\
Commands:
  /help     Show this help
  /clear    Forget the conversation so far
  /skills   List available skills
  /status   Show provider, model and memory backend
  exit      Leave (also: quit)

Anything else is sent to Jarvis as an instruction.";
