//! Error types and handling
//!
//! This module provides the error types used throughout the Jarvis engine.
//! All errors implement the `JarvisErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Recovery policy
//!
//! Skill-level and confirmation-level errors are recovered locally: the
//! registry turns them into a failed `SkillResult` whose text is the error's
//! `Display` output, and the reasoning step sees it as ordinary tool output.
//! Only reasoning-client failures and the iteration cap end a request.

use thiserror::Error;

/// Trait for Jarvis error extensions
pub trait JarvisErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never includes
    /// arguments, paths or secrets.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are fed back into the conversation so the
    /// reasoning step can retry or choose another approach.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, JarvisErrorExt};
///
/// let error = EngineError::UnknownSkill("teleport".to_string());
/// assert_eq!(error.to_string(), "unknown skill: teleport");
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::IterationLimitExceeded(10);
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Dispatch errors (recovered into a failed SkillResult)
    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    SkillExecution(String),

    #[error("skill '{skill}' timed out after {secs}s")]
    SkillTimeout { skill: String, secs: u64 },

    // Confirmation errors (recovered, default to denial)
    #[error("user denied execution")]
    ConfirmationDenied,

    #[error("confirmation timed out; execution denied")]
    ConfirmationTimeout,

    #[error("no confirmation handler available; execution denied")]
    ConfirmationUnavailable,

    // Security errors
    #[error("{0}")]
    ForbiddenAction(String),

    // Loop-level errors (terminal for the request)
    #[error("iteration limit of {0} reached")]
    IterationLimitExceeded(usize),

    #[error("reasoning client error: {0}")]
    Reasoning(String),

    #[error("request cancelled")]
    Cancelled,

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JarvisErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Conversation storage failed. Check the data directory",

            Self::UnknownSkill(_) => "The requested skill is not available",
            Self::InvalidParameters(_) => "The skill was called with invalid arguments",
            Self::SkillExecution(_) => "Skill execution failed",
            Self::SkillTimeout { .. } => "The skill took too long to finish",

            Self::ConfirmationDenied => "The action was not approved",
            Self::ConfirmationTimeout => "No answer to the confirmation prompt in time",
            Self::ConfirmationUnavailable => "Nobody is available to approve this action",

            Self::ForbiddenAction(_) => "This action is not permitted",

            Self::IterationLimitExceeded(_) => "Task too complex. Try breaking it into smaller steps",
            Self::Reasoning(_) => "Reasoning service unavailable. Check your API keys and network",
            Self::Cancelled => "The request was cancelled",

            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Config(_)
                | Self::IterationLimitExceeded(_)
                | Self::Reasoning(_)
                | Self::Cancelled
        )
    }
}
