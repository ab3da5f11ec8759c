//! Conversation memory and session context
//!
//! The planner records each instruction and each final answer through a
//! `MemoryStore`, and reads the recent window back as transcript history.
//! Intermediate tool traffic stays in the per-request transcript and is
//! never stored here.
//!
//! `ContextManager` supplies the short situational summary that goes into
//! the system prompt.

use async_trait::async_trait;
use chrono::Local;
use sdk::errors::EngineError;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::{MemoryBackend, MemoryConfig};
use crate::llm::{Message, MessageRole};
use crate::platform;

pub mod sqlite;

pub use sqlite::SqliteMemoryStore;

/// Persisted conversation history
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append one message
    async fn add_message(&self, role: MessageRole, content: &str) -> Result<(), EngineError>;

    /// Most recent messages, oldest first, bounded by the configured window
    async fn recent_context(&self) -> Result<Vec<Message>, EngineError>;

    /// Forget everything
    async fn clear(&self) -> Result<(), EngineError>;

    /// Flush and release the backing storage; later calls may fail
    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Situational context rendered into the system prompt
pub trait ContextManager: Send + Sync {
    fn context_summary(&self) -> String;

    fn set_current_task(&self, task: &str);

    fn clear_current_task(&self);
}

/// Window size in messages for `short_term_turns` user/assistant turns
pub fn window_size(short_term_turns: usize) -> usize {
    short_term_turns.saturating_mul(2).max(1)
}

/// Open the store selected by configuration
pub async fn open_store(config: &MemoryConfig) -> Result<Arc<dyn MemoryStore>, EngineError> {
    let window = window_size(config.short_term_turns);
    match config.backend {
        MemoryBackend::Memory => Ok(Arc::new(InMemoryStore::new(window))),
        MemoryBackend::Sqlite => Ok(Arc::new(
            SqliteMemoryStore::open(&config.database_path, window).await?,
        )),
    }
}

/// Process-local bounded window; oldest messages are evicted first
#[derive(Debug)]
pub struct InMemoryStore {
    window: usize,
    messages: Mutex<VecDeque<Message>>,
}

impl InMemoryStore {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            messages: Mutex::new(VecDeque::new()),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, VecDeque<Message>> {
        // A poisoned window is still a valid window.
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn add_message(&self, role: MessageRole, content: &str) -> Result<(), EngineError> {
        let mut messages = self.guard();
        messages.push_back(Message {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        });
        while messages.len() > self.window {
            messages.pop_front();
        }
        Ok(())
    }

    async fn recent_context(&self) -> Result<Vec<Message>, EngineError> {
        Ok(self.guard().iter().cloned().collect())
    }

    async fn clear(&self) -> Result<(), EngineError> {
        self.guard().clear();
        Ok(())
    }
}

/// Session context: time, operating system, working directory, current task
#[derive(Debug)]
pub struct SessionContext {
    working_directory: PathBuf,
    current_task: Mutex<Option<String>>,
}

impl SessionContext {
    pub fn new(working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            current_task: Mutex::new(None),
        }
    }

    pub fn current_task(&self) -> Option<String> {
        self.current_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ContextManager for SessionContext {
    fn context_summary(&self) -> String {
        let mut lines = vec![
            format!("Current time: {}", Local::now().format("%Y-%m-%d %H:%M:%S %A")),
            format!("Operating system: {}", platform::platform_name()),
            format!("Working directory: {}", self.working_directory.display()),
        ];
        if let Some(task) = self.current_task() {
            lines.push(format!("Current task: {}", task));
        }
        lines.join("\n")
    }

    fn set_current_task(&self, task: &str) {
        *self
            .current_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task.to_string());
    }

    fn clear_current_task(&self) {
        *self
            .current_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
