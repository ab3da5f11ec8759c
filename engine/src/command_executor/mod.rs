use crate::platform;
use crate::security_classifier::SecurityClassifier;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// CommandExecutor runs shell commands for the terminal skill.
///
/// # Security Features
/// - Deny-list re-check immediately before spawning, so an approved but
///   forbidden command is still refused
/// - stdin set to null, stdout/stderr piped
/// - Child killed when the timeout expires or the caller's future is dropped
/// - Spawn counter for auditing
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    classifier: SecurityClassifier,
    max_output_chars: usize,
    spawned: Arc<AtomicUsize>,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command rejected: contains forbidden operation '{0}'")]
    Forbidden(String),

    #[error("command timed out after {0}s")]
    TimedOut(u64),

    #[error("Command execution failed: {0}")]
    ExecutionFailed(#[from] std::io::Error),
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }
}

const TRUNCATION_MARKER: &str = "\n...(output truncated)";

impl CommandExecutor {
    /// Creates a CommandExecutor that vetoes commands through `classifier`.
    pub fn new(classifier: SecurityClassifier, max_output_chars: usize) -> Self {
        Self {
            classifier,
            max_output_chars,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Validates a command without executing it.
    pub fn validate(&self, command: &str) -> Result<(), CommandError> {
        match self.classifier.forbidden_match(command) {
            Some(entry) => Err(CommandError::Forbidden(entry.to_string())),
            None => Ok(()),
        }
    }

    /// Executes a command through the platform shell.
    ///
    /// # Execution
    /// - Re-classifies the command and refuses forbidden ones without spawning
    /// - Runs `/bin/sh -c` (Unix) or `cmd /C` (Windows) in `cwd` when given
    /// - Kills the child on timeout and returns `CommandError::TimedOut`
    /// - Trims both streams and truncates stdout to the configured limit
    pub async fn execute(
        &self,
        command: &str,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        if let Err(e) = self.validate(command) {
            warn!(command, "Refusing forbidden command at spawn time");
            return Err(e);
        }

        let mut cmd = platform::shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn()?;
        let total = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        info!(command, pid = child.id(), total_spawned = total, "Spawned command");

        // Dropping the wait future drops the child, and kill_on_drop kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(command, timeout_secs = timeout.as_secs(), "Command timed out, killed");
                return Err(CommandError::TimedOut(timeout.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        Ok(CommandOutput {
            returncode: output.status.code().unwrap_or(-1),
            stdout: truncate_chars(&stdout, self.max_output_chars),
            stderr,
        })
    }

    /// Number of processes spawned by this executor and its clones
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn classifier(&self) -> &SecurityClassifier {
        &self.classifier
    }
}

/// Truncate `text` to `limit` characters, appending a marker when cut
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
