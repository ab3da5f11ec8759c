//! Skill result, descriptor and schema types
//!
//! These types cross the dispatch boundary between the engine and a skill.
//! `ToolSchema` is the function-calling wire shape sent to the reasoning
//! backend and must serialize exactly as
//! `{type:"function", function:{name, description, parameters:{type:"object", properties, required}}}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments of a single skill invocation, keyed by parameter name.
pub type Params = Map<String, Value>;

/// Permission level of a skill
///
/// Governs the default confirmation requirement: only `Critical` skills
/// ask for approval unless the skill overrides `needs_confirmation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    /// Read-only, executes automatically
    ReadOnly,
    /// Reversible writes, executes automatically and is logged
    SafeWrite,
    /// Dangerous, must be confirmed
    Critical,
}

impl PermissionLevel {
    /// Default confirmation rule for this level
    pub fn requires_confirmation(self) -> bool {
        matches!(self, PermissionLevel::Critical)
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionLevel::ReadOnly => write!(f, "READ_ONLY"),
            PermissionLevel::SafeWrite => write!(f, "SAFE_WRITE"),
            PermissionLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Outcome of one skill invocation
///
/// Serialized verbatim into the tool-role message the reasoning step sees,
/// so `output` and `error` are always present (possibly `null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl SkillResult {
    /// Create a successful result carrying `output`
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// Create a failed result
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Create a failed result that still carries partial output
    pub fn failure_with_output(output: impl Into<Value>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Some(output.into()),
            error: Some(error.into()),
        }
    }

    /// Serialize to the JSON text placed in a tool-role message
    pub fn to_message_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"output":null,"error":"unserializable result: {}"}}"#,
                e
            )
        })
    }
}

/// Parameter schema of a skill (JSON-schema `object`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

/// Static description of a skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    pub permission_level: PermissionLevel,
    pub parameters: ParameterSchema,
}

impl SkillDescriptor {
    /// Create a descriptor with no parameters
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        permission_level: PermissionLevel,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            permission_level,
            parameters: ParameterSchema::default(),
        }
    }

    /// Add a parameter with its JSON schema
    pub fn with_param(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.parameters.required.push(name.clone());
        }
        self.parameters.properties.insert(name, schema);
        self
    }

    /// Render the function-calling tool definition
    pub fn to_tool_schema(&self) -> ToolSchema {
        ToolSchema {
            kind: "function".to_string(),
            function: FunctionSchema {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: FunctionParameters {
                    kind: "object".to_string(),
                    properties: self.parameters.properties.clone(),
                    required: self.parameters.required.clone(),
                },
            },
        }
    }
}

/// Tool definition in function-calling wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSchema,
}

/// `function` member of a [`ToolSchema`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

/// `parameters` member of a [`FunctionSchema`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameters {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

/// Typed accessors over [`Params`]
pub trait ParamsExt {
    /// Get a string parameter
    fn str_param(&self, key: &str) -> Option<&str>;

    /// Get an unsigned integer parameter (accepts numeric strings)
    fn u64_param(&self, key: &str) -> Option<u64>;
}

impl ParamsExt for Params {
    fn str_param(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    fn u64_param(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
