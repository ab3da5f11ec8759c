//! System control skill: launch applications, report host information

use async_trait::async_trait;
use chrono::Local;
use sdk::types::{Params, ParamsExt, PermissionLevel, SkillDescriptor, SkillResult};
use sdk::Skill;
use serde_json::json;
use tracing::info;

use super::{check_action, require_str};
use crate::platform;
use crate::security_classifier::{SecurityClassifier, Verdict};

const ACTIONS: &[&str] = &["open_app", "system_info"];

#[derive(Debug)]
pub struct SystemControlSkill {
    classifier: SecurityClassifier,
}

impl SystemControlSkill {
    pub fn new(classifier: SecurityClassifier) -> Self {
        Self { classifier }
    }

    fn open_app(&self, app_name: &str) -> SkillResult {
        info!(app = app_name, "Launching application");
        match platform::launch_application(app_name) {
            Ok(()) => SkillResult::success(json!({"app_name": app_name, "launched": true})),
            Err(e) => SkillResult::failure(format!("failed to launch '{}': {}", app_name, e)),
        }
    }

    fn system_info(&self) -> SkillResult {
        SkillResult::success(json!({
            "os": platform::platform_name(),
            "arch": std::env::consts::ARCH,
            "time": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }))
    }
}

#[async_trait]
impl Skill for SystemControlSkill {
    fn descriptor(&self) -> SkillDescriptor {
        SkillDescriptor::new(
            "system_control",
            "Open an application by name or report operating system, architecture and current time",
            PermissionLevel::SafeWrite,
        )
        .with_param(
            "action",
            json!({"type": "string", "enum": ACTIONS, "description": "Operation to perform"}),
            true,
        )
        .with_param(
            "app_name",
            json!({"type": "string", "description": "Application to open (open_app)"}),
            false,
        )
    }

    async fn execute(&self, params: &Params) -> SkillResult {
        match params.str_param("action").unwrap_or_default() {
            "open_app" => {
                let app_name = params.str_param("app_name").unwrap_or_default().trim();
                if let Some(reason) = self.forbidden_reason(params) {
                    return SkillResult::failure(reason);
                }
                self.open_app(app_name)
            }
            "system_info" => self.system_info(),
            other => SkillResult::failure(format!("unknown action '{}'", other)),
        }
    }

    /// Only bare names on the application allow-list launch unprompted
    fn needs_confirmation(&self, params: &Params) -> bool {
        match params.str_param("action") {
            Some("open_app") => {
                let app_name = params.str_param("app_name").unwrap_or_default();
                self.classifier.classify_application(app_name) != Verdict::Safe
            }
            _ => false,
        }
    }

    fn forbidden_reason(&self, params: &Params) -> Option<String> {
        if params.str_param("action") != Some("open_app") {
            return None;
        }
        let app_name = params.str_param("app_name")?;
        self.classifier
            .forbidden_match(app_name)
            .map(|pattern| {
                format!(
                    "application rejected: '{}' matches forbidden operation '{}'",
                    app_name, pattern
                )
            })
    }

    fn validate_params(&self, params: &Params) -> Option<String> {
        if let Some(err) = check_action(params, ACTIONS) {
            return Some(err);
        }
        match params.str_param("action") {
            Some("open_app") => require_str(params, "app_name"),
            _ => None,
        }
    }
}
