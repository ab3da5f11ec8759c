//! Jarvis SDK
//!
//! Shared contract between the engine and the skills it dispatches:
//! the `Skill` trait, the result/descriptor types that cross the dispatch
//! boundary, and the engine-wide error taxonomy.

/// Skill trait
pub mod skill;

/// Error types and handling
pub mod errors;

/// Skill result, descriptor and schema types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, JarvisErrorExt};
pub use skill::Skill;
pub use types::{Params, PermissionLevel, SkillDescriptor, SkillResult, ToolSchema};
