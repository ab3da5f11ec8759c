//! File manager skill
//!
//! Reads, writes, lists and deletes files. Every path is resolved against
//! the workspace, normalized and classified before any I/O:
//!
//! - paths in a forbidden directory are refused without prompting
//! - paths outside the allowed directories need confirmation
//! - `delete_file` always needs confirmation

use async_trait::async_trait;
use sdk::types::{Params, ParamsExt, PermissionLevel, SkillDescriptor, SkillResult};
use sdk::Skill;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::{check_action, require_str};
use crate::command_executor::truncate_chars;
use crate::config::expand_path;
use crate::security_classifier::{normalize, SecurityClassifier, Verdict};

const ACTIONS: &[&str] = &[
    "read_file",
    "write_file",
    "list_dir",
    "file_exists",
    "delete_file",
];

#[derive(Debug)]
pub struct FileManagerSkill {
    classifier: SecurityClassifier,
    workspace: PathBuf,
    max_output_chars: usize,
}

impl FileManagerSkill {
    pub fn new(classifier: SecurityClassifier, workspace: PathBuf, max_output_chars: usize) -> Self {
        Self {
            classifier,
            workspace,
            max_output_chars,
        }
    }

    /// Expand `~`, anchor relative paths at the workspace, normalize
    fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = expand_path(Path::new(raw)).unwrap_or_else(|_| PathBuf::from(raw));
        let absolute = if path.is_absolute() {
            path
        } else {
            self.workspace.join(path)
        };
        normalize(&absolute)
    }

    fn verdict(&self, params: &Params) -> Option<(PathBuf, Verdict)> {
        let path = self.resolve_path(params.str_param("path")?);
        let verdict = self.classifier.classify_path(&path);
        Some((path, verdict))
    }

    async fn read_file(&self, path: &Path) -> SkillResult {
        info!("Reading file: {}", path.display());
        match fs::read_to_string(path).await {
            Ok(content) => {
                debug!("Read {} bytes from {}", content.len(), path.display());
                SkillResult::success(json!({
                    "path": path.display().to_string(),
                    "content": truncate_chars(&content, self.max_output_chars),
                }))
            }
            Err(e) => SkillResult::failure(format!("failed to read {}: {}", path.display(), e)),
        }
    }

    async fn write_file(&self, path: &Path, content: &str) -> SkillResult {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return SkillResult::failure(format!(
                    "failed to create directories {}: {}",
                    parent.display(),
                    e
                ));
            }
        }

        info!("Writing {} bytes to: {}", content.len(), path.display());
        match fs::write(path, content).await {
            Ok(()) => SkillResult::success(json!({
                "path": path.display().to_string(),
                "bytes_written": content.len(),
            })),
            Err(e) => SkillResult::failure(format!("failed to write {}: {}", path.display(), e)),
        }
    }

    async fn list_dir(&self, path: &Path) -> SkillResult {
        info!("Listing directory: {}", path.display());
        let mut entries = match fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) => {
                return SkillResult::failure(format!(
                    "failed to read directory {}: {}",
                    path.display(),
                    e
                ))
            }
        };

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return SkillResult::failure(format!("failed to list entry: {}", e)),
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                dirs.push(json!({"name": name, "type": "dir"}));
            } else {
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                let kind = if file_type.is_symlink() { "symlink" } else { "file" };
                files.push(json!({"name": name, "type": kind, "size": size}));
            }
        }

        let by_name = |a: &serde_json::Value, b: &serde_json::Value| {
            a["name"].as_str().cmp(&b["name"].as_str())
        };
        dirs.sort_by(by_name);
        files.sort_by(by_name);

        let count = dirs.len() + files.len();
        dirs.extend(files);
        SkillResult::success(json!({
            "path": path.display().to_string(),
            "count": count,
            "entries": dirs,
        }))
    }

    async fn file_exists(&self, path: &Path) -> SkillResult {
        let metadata = fs::metadata(path).await.ok();
        SkillResult::success(json!({
            "path": path.display().to_string(),
            "exists": metadata.is_some(),
            "is_dir": metadata.map(|m| m.is_dir()).unwrap_or(false),
        }))
    }

    async fn delete_file(&self, path: &Path) -> SkillResult {
        match fs::metadata(path).await {
            Ok(m) if m.is_dir() => {
                return SkillResult::failure(format!(
                    "{} is a directory; only files can be deleted",
                    path.display()
                ))
            }
            Ok(_) => {}
            Err(e) => return SkillResult::failure(format!("cannot delete {}: {}", path.display(), e)),
        }

        info!("Deleting file: {}", path.display());
        match fs::remove_file(path).await {
            Ok(()) => SkillResult::success(json!({
                "path": path.display().to_string(),
                "deleted": true,
            })),
            Err(e) => SkillResult::failure(format!("failed to delete {}: {}", path.display(), e)),
        }
    }
}

#[async_trait]
impl Skill for FileManagerSkill {
    fn descriptor(&self) -> SkillDescriptor {
        SkillDescriptor::new(
            "file_manager",
            "Read, write, list, check and delete files. Protected directories are refused; paths outside the allowed directories and all deletions need confirmation",
            PermissionLevel::SafeWrite,
        )
        .with_param(
            "action",
            json!({"type": "string", "enum": ACTIONS, "description": "Operation to perform"}),
            true,
        )
        .with_param(
            "path",
            json!({"type": "string", "description": "File or directory path; relative paths start at the workspace"}),
            true,
        )
        .with_param(
            "content",
            json!({"type": "string", "description": "Text to write (write_file only)"}),
            false,
        )
    }

    async fn execute(&self, params: &Params) -> SkillResult {
        let Some((path, verdict)) = self.verdict(params) else {
            return SkillResult::failure("missing required parameter 'path'");
        };
        if verdict.is_forbidden() {
            return SkillResult::failure(format!(
                "path rejected: {} is in a protected directory",
                path.display()
            ));
        }

        match params.str_param("action").unwrap_or_default() {
            "read_file" => self.read_file(&path).await,
            "write_file" => {
                let content = params.str_param("content").unwrap_or_default();
                self.write_file(&path, content).await
            }
            "list_dir" => self.list_dir(&path).await,
            "file_exists" => self.file_exists(&path).await,
            "delete_file" => self.delete_file(&path).await,
            other => SkillResult::failure(format!("unknown action '{}'", other)),
        }
    }

    fn needs_confirmation(&self, params: &Params) -> bool {
        if params.str_param("action") == Some("delete_file") {
            return true;
        }
        self.verdict(params)
            .map_or(true, |(_, verdict)| !verdict.is_safe())
    }

    fn forbidden_reason(&self, params: &Params) -> Option<String> {
        let (path, verdict) = self.verdict(params)?;
        verdict.is_forbidden().then(|| {
            format!(
                "path rejected: {} is in a protected directory",
                path.display()
            )
        })
    }

    fn validate_params(&self, params: &Params) -> Option<String> {
        check_action(params, ACTIONS)
            .or_else(|| require_str(params, "path"))
            .or_else(|| {
                let writes = params.str_param("action") == Some("write_file");
                (writes && params.str_param("content").is_none())
                    .then(|| "write_file requires a string 'content'".to_string())
            })
    }
}
