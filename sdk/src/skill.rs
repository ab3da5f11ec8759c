//! Skill trait
//!
//! Every capability the planner can invoke implements `Skill`. The engine's
//! registry consults the predicates in this order for each call:
//!
//! 1. `validate_params` — malformed calls never reach confirmation
//! 2. `forbidden_reason` — classifier veto, never prompts and never executes
//! 3. `needs_confirmation` — routes the call through the confirmation gate
//! 4. `execute`
//!
//! `execute` reports failures through `SkillResult` instead of erroring; the
//! registry still isolates panics and timeouts at its boundary.

use async_trait::async_trait;

use crate::types::{Params, SkillDescriptor, SkillResult};

/// Trait that all skills must implement
#[async_trait]
pub trait Skill: Send + Sync {
    /// Static description: name, description, permission level, parameter schema
    fn descriptor(&self) -> SkillDescriptor;

    /// Run the skill
    async fn execute(&self, params: &Params) -> SkillResult;

    /// Whether this particular call must be approved before executing.
    ///
    /// Defaults to the permission-level rule (`CRITICAL` only).
    fn needs_confirmation(&self, _params: &Params) -> bool {
        self.descriptor().permission_level.requires_confirmation()
    }

    /// Reason this call must be refused outright, if any.
    ///
    /// A `Some` here wins over every confirmation outcome.
    fn forbidden_reason(&self, _params: &Params) -> Option<String> {
        None
    }

    /// Validate the arguments, returning an error description on failure.
    ///
    /// Defaults to checking that every required parameter is present.
    fn validate_params(&self, params: &Params) -> Option<String> {
        self.descriptor()
            .parameters
            .required
            .iter()
            .find(|key| params.get(key.as_str()).map_or(true, |v| v.is_null()))
            .map(|key| format!("missing required parameter '{}'", key))
    }
}
