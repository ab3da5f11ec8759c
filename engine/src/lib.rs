//! Jarvis Engine Library
//!
//! Runtime of the Jarvis assistant: the planner loop, skill registry,
//! confirmation gate, security classifier and their collaborators. Used by
//! the `jarvis` binary and by integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Command and path classification
pub mod security_classifier;

/// Shell command execution
pub mod command_executor;

/// Platform-specific utilities module
pub mod platform;

/// Approval of critical actions
pub mod confirmation;

/// Reasoning client abstraction and OpenAI-compatible client
pub mod llm;

/// Conversation memory and session context
pub mod memory;

/// Skill registry and built-in skills
pub mod skills;

/// Planner loop
pub mod agent;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
