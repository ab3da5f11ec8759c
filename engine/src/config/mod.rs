//! Configuration management
//!
//! This module handles loading, validation, and management of the Jarvis configuration.
//! Configuration is stored in TOML format at ~/.jarvis/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace path, log level, data directory
//! - **llm**: Reasoning provider selection and per-provider endpoints
//! - **agent**: Planner loop limits
//! - **security**: Allow/deny lists, confirmation policy, process limits
//! - **memory**: Conversation store backend and window size
//! - **skills**: Built-in skill enablement and web settings
//!
//! The loaded `Config` is an explicit value: it is constructed once at startup
//! and handed to every component that needs it. Nothing reads it globally.
//!
//! API keys are never stored here; they are read from `OPENAI_API_KEY` /
//! `DEEPSEEK_API_KEY` when the reasoning client is built.
//!
//! # Examples
//!
//! ```no_run
//! use jarvis_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Provider: {}", config.llm.provider);
//! println!("Max iterations: {}", config.agent.max_iterations);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Reasoning provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Planner loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Security settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Built-in skill settings
    #[serde(default)]
    pub skills: SkillsConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Default working directory for skills (supports ~ expansion)
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Reasoning provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Active provider (openai, deepseek, ollama)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Sampling temperature (0.0-2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout for a single reasoning call (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// OpenAI provider settings
    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,

    /// DeepSeek provider settings
    #[serde(default = "default_deepseek")]
    pub deepseek: ProviderConfig,

    /// Ollama provider settings
    #[serde(default = "default_ollama")]
    pub ollama: ProviderConfig,
}

/// Endpoint of one OpenAI-compatible provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL, without the trailing `/chat/completions`
    pub base_url: String,

    /// Model name
    pub model: String,
    // Note: API key read from environment, not from config
}

/// Planner loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum reasoning calls per instruction
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Upper bound on a single skill execution (seconds)
    #[serde(default = "default_skill_timeout")]
    pub skill_timeout_secs: u64,

    /// Replaces the built-in persona text when set
    #[serde(default)]
    pub persona: Option<String>,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Directories skills may touch without confirmation
    #[serde(default = "default_allowed_directories")]
    pub allowed_directories: Vec<PathBuf>,

    /// Directories skills may never touch; wins over the allow-list
    #[serde(default = "default_forbidden_directories")]
    pub forbidden_directories: Vec<PathBuf>,

    /// Read-only commands that run without confirmation
    #[serde(default = "default_safe_commands")]
    pub safe_commands: Vec<String>,

    /// Substrings that make a command forbidden (case-insensitive)
    #[serde(default = "default_forbidden_commands")]
    pub forbidden_commands: Vec<String>,

    /// Application names `open_app` launches without confirmation
    #[serde(default = "default_safe_apps")]
    pub safe_apps: Vec<String>,

    /// Ask before running critical actions; `false` auto-approves them
    #[serde(default = "default_true")]
    pub require_confirmation: bool,

    /// How long to wait for an answer before denying (seconds)
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Default timeout for terminal commands (seconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Truncation limit for command output and page text (characters)
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

/// Conversation store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// Process-local window, lost on exit
    Memory,
    /// SQLite file at `database_path`
    Sqlite,
}

/// Memory system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Store backend
    #[serde(default = "default_memory_backend")]
    pub backend: MemoryBackend,

    /// Number of recent turns (user + assistant) handed to the planner
    #[serde(default = "default_short_term_turns")]
    pub short_term_turns: usize,

    /// SQLite database path (supports ~ expansion)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

/// Built-in skill enablement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Enable the terminal skill
    #[serde(default = "default_true")]
    pub terminal: bool,

    /// Enable the file manager skill
    #[serde(default = "default_true", rename = "file-manager")]
    pub file_manager: bool,

    /// Enable the web browser skill
    #[serde(default = "default_true", rename = "web-browser")]
    pub web_browser: bool,

    /// Enable the system control skill
    #[serde(default = "default_true", rename = "system-control")]
    pub system_control: bool,

    /// Web browser settings
    #[serde(default)]
    pub web: WebConfig,
}

/// Web browser skill configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// HTML search endpoint
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP timeout (seconds)
    #[serde(default = "default_web_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_workspace() -> PathBuf {
    PathBuf::from("~")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.jarvis")
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout() -> u64 {
    120
}

fn default_openai() -> ProviderConfig {
    ProviderConfig {
        base_url: "https://api.openai.com/v1".to_string(),
        model: "gpt-4o".to_string(),
    }
}

fn default_deepseek() -> ProviderConfig {
    ProviderConfig {
        base_url: "https://api.deepseek.com".to_string(),
        model: "deepseek-chat".to_string(),
    }
}

fn default_ollama() -> ProviderConfig {
    ProviderConfig {
        base_url: "http://localhost:11434/v1".to_string(),
        model: "llama3".to_string(),
    }
}

fn default_max_iterations() -> usize {
    10
}

fn default_skill_timeout() -> u64 {
    60
}

fn home_join(rest: &str) -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(rest))
        .unwrap_or_else(|| PathBuf::from(format!("~/{}", rest)))
}

fn default_allowed_directories() -> Vec<PathBuf> {
    vec![
        home_join("Desktop"),
        home_join("Documents"),
        home_join("Downloads"),
    ]
}

fn default_forbidden_directories() -> Vec<PathBuf> {
    [
        "C:\\Windows",
        "C:\\Program Files",
        "C:\\Program Files (x86)",
        "/System",
        "/usr",
        "/bin",
        "/etc",
    ]
    .iter()
    .map(PathBuf::from)
    .chain([home_join(".ssh"), home_join(".gnupg"), home_join(".aws")])
    .collect()
}

fn default_safe_commands() -> Vec<String> {
    [
        "dir",
        "ls",
        "cat",
        "type",
        "echo",
        "pwd",
        "cd",
        "whoami",
        "date",
        "time",
        "hostname",
        "python --version",
        "pip list",
        "node --version",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_forbidden_commands() -> Vec<String> {
    [
        "rm -rf",
        "del /f",
        "format",
        "mkfs",
        "shutdown",
        "reboot",
        "halt",
        "DROP",
        "DELETE FROM",
        "TRUNCATE",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_safe_apps() -> Vec<String> {
    [
        "notepad",
        "calc",
        "calculator",
        "gnome-calculator",
        "gedit",
        "textedit",
        "firefox",
        "chrome",
        "safari",
        "explorer",
        "finder",
        "code",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_confirmation_timeout() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    30
}

fn default_max_output_chars() -> usize {
    5000
}

fn default_memory_backend() -> MemoryBackend {
    MemoryBackend::Memory
}

fn default_short_term_turns() -> usize {
    20
}

fn default_database_path() -> PathBuf {
    PathBuf::from("~/.jarvis/memory.db")
}

fn default_search_url() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_web_timeout() -> u64 {
    30
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            openai: default_openai(),
            deepseek: default_deepseek(),
            ollama: default_ollama(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            skill_timeout_secs: default_skill_timeout(),
            persona: None,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_directories: default_allowed_directories(),
            forbidden_directories: default_forbidden_directories(),
            safe_commands: default_safe_commands(),
            forbidden_commands: default_forbidden_commands(),
            safe_apps: default_safe_apps(),
            require_confirmation: true,
            confirmation_timeout_secs: default_confirmation_timeout(),
            command_timeout_secs: default_command_timeout(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            short_term_turns: default_short_term_turns(),
            database_path: default_database_path(),
        }
    }
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            terminal: true,
            file_manager: true,
            web_browser: true,
            system_control: true,
            web: WebConfig::default(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_web_timeout(),
        }
    }
}

impl LLMConfig {
    /// Endpoint of the active provider
    pub fn active(&self) -> Result<&ProviderConfig, EngineError> {
        match self.provider.as_str() {
            "openai" => Ok(&self.openai),
            "deepseek" => Ok(&self.deepseek),
            "ollama" => Ok(&self.ollama),
            other => Err(EngineError::Config(format!(
                "Unknown provider '{}'",
                other
            ))),
        }
    }

    /// Environment variable holding the API key of the active provider
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            "deepseek" => Some("DEEPSEEK_API_KEY"),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AgentConfig {
    pub fn skill_timeout(&self) -> Duration {
        Duration::from_secs(self.skill_timeout_secs)
    }
}

impl SecurityConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.jarvis/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and process configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.jarvis/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".jarvis").join("config.toml"))
    }

    /// Check value ranges without touching the filesystem
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["openai", "deepseek", "ollama"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(EngineError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(EngineError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let timeouts = [
            ("request_timeout_secs", self.llm.request_timeout_secs),
            ("skill_timeout_secs", self.agent.skill_timeout_secs),
            (
                "confirmation_timeout_secs",
                self.security.confirmation_timeout_secs,
            ),
            ("command_timeout_secs", self.security.command_timeout_secs),
            ("web.timeout_secs", self.skills.web.timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(EngineError::Config(format!("{} must be at least 1", name)));
        }

        if self.memory.short_term_turns == 0 {
            return Err(EngineError::Config(
                "short_term_turns must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates value ranges
    /// - Expands ~ in paths
    /// - Canonicalizes the workspace, creating it if missing
    /// - Creates the data directory if missing
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.workspace = expand_path(&self.core.workspace)?;
        self.core.workspace = canonicalize_or_create(&self.core.workspace)?;

        if !self.core.workspace.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                self.core.workspace
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        self.memory.database_path = expand_path(&self.memory.database_path)?;

        for dir in self
            .security
            .allowed_directories
            .iter_mut()
            .chain(self.security.forbidden_directories.iter_mut())
        {
            *dir = expand_path(dir)?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize()
        .map_err(|e| EngineError::Config(format!("Failed to resolve {:?}: {}", path, e)))
}
