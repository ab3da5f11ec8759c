//! Terminal skill
//!
//! Runs shell commands through `CommandExecutor`. The skill is `CRITICAL`,
//! but commands the classifier considers read-only skip the confirmation
//! prompt, and forbidden commands are refused before anyone is asked.

use async_trait::async_trait;
use sdk::types::{Params, ParamsExt, PermissionLevel, SkillDescriptor, SkillResult};
use sdk::Skill;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::{check_action, optional_positive, require_str};
use crate::command_executor::{CommandError, CommandExecutor};
use crate::config::expand_path;

const ACTIONS: &[&str] = &["run_command", "run_safe_command"];

#[derive(Debug)]
pub struct TerminalSkill {
    executor: CommandExecutor,
    work_dir: PathBuf,
    default_timeout: Duration,
}

impl TerminalSkill {
    pub fn new(executor: CommandExecutor, work_dir: PathBuf, default_timeout: Duration) -> Self {
        Self {
            executor,
            work_dir,
            default_timeout,
        }
    }

    fn resolve_cwd(&self, params: &Params) -> PathBuf {
        match params.str_param("cwd").map(str::trim).filter(|s| !s.is_empty()) {
            Some(dir) => {
                let dir = expand_path(std::path::Path::new(dir))
                    .unwrap_or_else(|_| PathBuf::from(dir));
                if dir.is_absolute() {
                    dir
                } else {
                    self.work_dir.join(dir)
                }
            }
            None => self.work_dir.clone(),
        }
    }

    async fn run(&self, command: &str, params: &Params) -> SkillResult {
        let cwd = self.resolve_cwd(params);
        let timeout = params
            .u64_param("timeout")
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        info!(command, cwd = %cwd.display(), "Running terminal command");

        match self.executor.execute(command, Some(&cwd), timeout).await {
            Ok(output) => {
                let returncode = output.returncode;
                let value = json!({
                    "returncode": output.returncode,
                    "stdout": output.stdout,
                    "stderr": output.stderr,
                });
                if output.success() {
                    SkillResult::success(value)
                } else {
                    SkillResult::failure_with_output(
                        value,
                        format!("command exited with status {}", returncode),
                    )
                }
            }
            Err(e @ CommandError::Forbidden(_)) | Err(e @ CommandError::TimedOut(_)) => {
                SkillResult::failure(e.to_string())
            }
            Err(CommandError::ExecutionFailed(e)) => {
                SkillResult::failure(format!("failed to start command: {}", e))
            }
        }
    }
}

#[async_trait]
impl Skill for TerminalSkill {
    fn descriptor(&self) -> SkillDescriptor {
        SkillDescriptor::new(
            "terminal",
            "Run a terminal command. Forbidden commands are refused; commands outside the read-only list need user confirmation",
            PermissionLevel::Critical,
        )
        .with_param(
            "action",
            json!({
                "type": "string",
                "enum": ACTIONS,
                "description": "run_command asks for confirmation unless the command is read-only; run_safe_command only runs read-only commands"
            }),
            true,
        )
        .with_param(
            "command",
            json!({"type": "string", "description": "Command line to execute"}),
            true,
        )
        .with_param(
            "cwd",
            json!({"type": "string", "description": "Working directory (optional)"}),
            false,
        )
        .with_param(
            "timeout",
            json!({"type": "integer", "description": "Timeout in seconds (optional)"}),
            false,
        )
    }

    async fn execute(&self, params: &Params) -> SkillResult {
        let command = params.str_param("command").unwrap_or_default();

        match params.str_param("action").unwrap_or_default() {
            "run_safe_command" => {
                if !self.executor.classifier().classify_command(command).is_safe() {
                    return SkillResult::failure(format!(
                        "command is not on the safe list: {}",
                        command
                    ));
                }
                self.run(command, params).await
            }
            "run_command" => self.run(command, params).await,
            other => SkillResult::failure(format!("unknown action '{}'", other)),
        }
    }

    fn needs_confirmation(&self, params: &Params) -> bool {
        if params.str_param("action") == Some("run_safe_command") {
            // refused in `execute` when not read-only
            return false;
        }
        let command = params.str_param("command").unwrap_or_default();
        !self.executor.classifier().classify_command(command).is_safe()
    }

    fn forbidden_reason(&self, params: &Params) -> Option<String> {
        let command = params.str_param("command")?;
        self.executor
            .validate(command)
            .err()
            .map(|e| e.to_string())
    }

    fn validate_params(&self, params: &Params) -> Option<String> {
        check_action(params, ACTIONS)
            .or_else(|| require_str(params, "command"))
            .or_else(|| optional_positive(params, "timeout"))
    }
}
