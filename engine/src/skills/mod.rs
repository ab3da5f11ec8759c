//! Skill registry and dispatch
//!
//! The registry maps skill names to handlers. It is built once at startup
//! and is read-only afterwards, so one instance can be shared by every
//! concurrent planner run.
//!
//! `dispatch` never fails: unknown skills, invalid arguments, forbidden
//! actions, denied confirmations, panics, timeouts and cancellation all come
//! back as a failed `SkillResult` so the reasoning step can react to them.

use futures::FutureExt;
use sdk::errors::EngineError;
use sdk::{Skill, SkillDescriptor, SkillResult, ToolSchema};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command_executor::CommandExecutor;
use crate::config::Config;
use crate::confirmation::ConfirmationGate;
use crate::llm::ToolCall;
use crate::security_classifier::SecurityClassifier;

pub mod file_manager;
pub mod system_control;
pub mod terminal;
pub mod web_browser;

pub use file_manager::FileManagerSkill;
pub use system_control::SystemControlSkill;
pub use terminal::TerminalSkill;
pub use web_browser::WebBrowserSkill;

/// Registry of skills the planner can dispatch to
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    order: Vec<String>,
    skill_timeout: Duration,
}

impl SkillRegistry {
    /// Create an empty registry
    pub fn new(skill_timeout: Duration) -> Self {
        Self {
            skills: HashMap::new(),
            order: Vec::new(),
            skill_timeout,
        }
    }

    /// Create a registry holding every built-in skill enabled in `config`
    pub fn with_builtin_skills(
        config: &Config,
        executor: CommandExecutor,
    ) -> Result<Self, EngineError> {
        let classifier = SecurityClassifier::new(&config.security);
        let workspace = config.core.workspace.clone();
        let mut registry = Self::new(config.agent.skill_timeout());

        if config.skills.terminal {
            registry.register(
                "terminal",
                Arc::new(TerminalSkill::new(
                    executor,
                    workspace.clone(),
                    config.security.command_timeout(),
                )),
            );
        }

        if config.skills.file_manager {
            registry.register(
                "file_manager",
                Arc::new(FileManagerSkill::new(
                    classifier.clone(),
                    workspace,
                    config.security.max_output_chars,
                )),
            );
        }

        if config.skills.web_browser {
            registry.register(
                "web_browser",
                Arc::new(WebBrowserSkill::new(
                    &config.skills.web,
                    config.security.max_output_chars,
                )?),
            );
        }

        if config.skills.system_control {
            registry.register("system_control", Arc::new(SystemControlSkill::new(classifier)));
        }

        Ok(registry)
    }

    /// Register a handler under `name`, replacing any previous one
    pub fn register(&mut self, name: impl Into<String>, skill: Arc<dyn Skill>) {
        let name = name.into();
        if self.skills.insert(name.clone(), skill).is_some() {
            warn!(skill = %name, "Replacing previously registered skill");
        } else {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Skill>> {
        self.skills.get(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> Vec<SkillDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.skills.get(name))
            .map(|skill| skill.descriptor())
            .collect()
    }

    /// Function-calling schemas for the reasoning call
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.descriptors()
            .iter()
            .map(SkillDescriptor::to_tool_schema)
            .collect()
    }

    /// One `- name: description` line per skill, for the system prompt
    pub fn describe(&self) -> String {
        self.descriptors()
            .iter()
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Dispatch one tool call
    ///
    /// Order of checks: unknown skill, parameter validation, forbidden
    /// verdict, confirmation, execution. A forbidden call is refused before
    /// any confirmation prompt is shown.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        gate: &ConfirmationGate,
        cancel: &CancellationToken,
    ) -> SkillResult {
        let args = Value::Object(call.arguments.clone());

        let Some(skill) = self.skills.get(&call.name) else {
            warn!(skill = %call.name, id = %call.id, %args, "Unknown skill requested");
            return SkillResult::failure(EngineError::UnknownSkill(call.name.clone()).to_string());
        };

        let descriptor = skill.descriptor();
        info!(
            skill = %call.name,
            id = %call.id,
            permission = %descriptor.permission_level,
            %args,
            "Dispatching skill"
        );

        let fail = |err: EngineError| {
            warn!(skill = %call.name, id = %call.id, %args, error = %err, "Skill call failed");
            SkillResult::failure(err.to_string())
        };

        if let Some(reason) = skill.validate_params(&call.arguments) {
            return fail(EngineError::InvalidParameters(reason));
        }

        if let Some(reason) = skill.forbidden_reason(&call.arguments) {
            return fail(EngineError::ForbiddenAction(reason));
        }

        if skill.needs_confirmation(&call.arguments) {
            let description = format!(
                "{} ({}) wants to run with {}",
                call.name, descriptor.permission_level, args
            );
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return fail(EngineError::Cancelled),
                outcome = gate.decide(&description) => outcome,
            };
            if let Some(err) = outcome.into_error() {
                return fail(err);
            }
        }

        let execution = AssertUnwindSafe(skill.execute(&call.arguments)).catch_unwind();

        // Dropping `execution` on timeout or cancellation drops any child
        // process handle the skill holds, which kills the child.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return fail(EngineError::Cancelled),
            finished = tokio::time::timeout(self.skill_timeout, execution) => match finished {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => {
                    return fail(EngineError::SkillExecution(format!(
                        "skill '{}' panicked: {}",
                        call.name,
                        panic_message(panic.as_ref())
                    )))
                }
                Err(_) => {
                    return fail(EngineError::SkillTimeout {
                        skill: call.name.clone(),
                        secs: self.skill_timeout.as_secs(),
                    })
                }
            },
        };

        if result.success {
            info!(skill = %call.name, id = %call.id, "Skill call succeeded");
        } else {
            warn!(
                skill = %call.name,
                id = %call.id,
                %args,
                error = result.error.as_deref().unwrap_or_default(),
                "Skill reported failure"
            );
        }

        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Action names listed in a skill's `action` enum
pub(crate) fn check_action(params: &sdk::Params, allowed: &[&str]) -> Option<String> {
    match params.get("action").and_then(Value::as_str) {
        Some(action) if allowed.contains(&action) => None,
        Some(action) => Some(format!(
            "unknown action '{}'; expected one of: {}",
            action,
            allowed.join(", ")
        )),
        None => Some("parameter 'action' must be a string".to_string()),
    }
}

/// Require a non-empty string parameter
pub(crate) fn require_str(params: &sdk::Params, key: &str) -> Option<String> {
    match params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => None,
        Some(Value::String(_)) => Some(format!("parameter '{}' must not be empty", key)),
        Some(Value::Null) | None => Some(format!("missing required parameter '{}'", key)),
        Some(_) => Some(format!("parameter '{}' must be a string", key)),
    }
}

/// Accept an optional positive integer parameter
pub(crate) fn optional_positive(params: &sdk::Params, key: &str) -> Option<String> {
    use sdk::types::ParamsExt;
    match params.get(key) {
        None | Some(Value::Null) => None,
        Some(_) => match params.u64_param(key) {
            Some(n) if n > 0 => None,
            _ => Some(format!("parameter '{}' must be a positive integer", key)),
        },
    }
}
