//! SQLite conversation store
//!
//! Keeps the transcript across sessions in `conversation_messages`. The
//! database runs in WAL mode; SQLite replays an outstanding WAL on open, so
//! an unclean shutdown loses nothing that was committed.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::MemoryStore;
use crate::llm::{Message, MessageRole};

/// Conversation store backed by SQLite
#[derive(Debug, Clone)]
pub struct SqliteMemoryStore {
    pool: SqlitePool,
    window: usize,
}

fn db_error(context: &str, err: sqlx::Error) -> EngineError {
    EngineError::Database(format!("{}: {}", context, err))
}

impl SqliteMemoryStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub async fn open(db_path: &Path, window: usize) -> Result<Self, EngineError> {
        info!("Opening conversation store at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| db_error("Invalid database path", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to connect to database", e))?;

        sqlx::raw_sql(include_str!("../../migrations/001_conversation.sql"))
            .execute(&pool)
            .await
            .map_err(|e| db_error("Failed to execute migration 001_conversation.sql", e))?;

        debug!("Conversation store ready");

        Ok(Self {
            pool,
            window: window.max(1),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn add_message(&self, role: MessageRole, content: &str) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO conversation_messages (role, content, created_at) VALUES (?, ?, ?)",
        )
        .bind(role.as_str())
        .bind(content)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to store message", e))?;

        Ok(())
    }

    async fn recent_context(&self) -> Result<Vec<Message>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT role, content FROM (
                SELECT id, role, content
                FROM conversation_messages
                ORDER BY id DESC
                LIMIT ?
            )
            ORDER BY id ASC
            "#,
        )
        .bind(self.window as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load recent messages", e))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.get("role");
            let content: String = row.get("content");
            match role.parse::<MessageRole>() {
                Ok(role) => messages.push(Message {
                    role,
                    content,
                    tool_calls: None,
                    tool_call_id: None,
                }),
                Err(e) => warn!("Skipping stored message: {}", e),
            }
        }

        Ok(messages)
    }

    async fn clear(&self) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM conversation_messages")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to clear messages", e))?;
        Ok(())
    }

    /// Checkpoint the WAL and close all connections
    async fn close(&self) -> Result<(), EngineError> {
        if self.pool.is_closed() {
            return Ok(());
        }
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to flush WAL", e))?;
        self.pool.close().await;
        debug!("Conversation store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_creation_and_wal() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("memory.db");

        let store = SqliteMemoryStore::open(&db_path, 10).await.unwrap();
        assert!(db_path.exists());

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_recent_context_is_windowed_and_chronological() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteMemoryStore::open(&temp_dir.path().join("m.db"), 3)
            .await
            .unwrap();

        for i in 0..5 {
            store
                .add_message(MessageRole::User, &format!("m{}", i))
                .await
                .unwrap();
        }

        let recent = store.recent_context().await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.db");

        let store = SqliteMemoryStore::open(&path, 10).await.unwrap();
        store.add_message(MessageRole::User, "hello").await.unwrap();
        store
            .add_message(MessageRole::Assistant, "hi there")
            .await
            .unwrap();
        store.close().await.unwrap();

        let reopened = SqliteMemoryStore::open(&path, 10).await.unwrap();
        let recent = reopened.recent_context().await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].role, MessageRole::Assistant);

        reopened.clear().await.unwrap();
        assert!(reopened.recent_context().await.unwrap().is_empty());

        reopened.close().await.unwrap();
        assert!(reopened.pool().is_closed());
        // closing twice is harmless
        reopened.close().await.unwrap();
    }
}
