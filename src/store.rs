use crate::chat::{Chat, Message};
use anyhow::{Context, Result};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, Row, SqlitePool};
use std::{path::Path, str::FromStr};

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        // foreign_keys must be on for the messages -> chats cascade
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat_created ON messages(chat_id, created_at DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Persist a new chat.
    pub async fn create_chat(&self, chat: &Chat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chats (id, title, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&chat.id)
        .bind(&chat.title)
        .bind(chat.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save chat")?;

        Ok(())
    }

    /// Fetch a chat by id. Returns None if no such chat exists.
    pub async fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, created_at
            FROM chats
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch chat")?;

        match row {
            Some(row) => Ok(Some(Chat {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    /// Delete a chat and, via the foreign-key cascade, all its messages.
    /// Returns false if no chat with the given id existed.
    pub async fn delete_chat(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete chat")?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist a new message under its owning chat.
    pub async fn create_message(&self, msg: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, text, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&msg.id)
        .bind(&msg.chat_id)
        .bind(&msg.text)
        .bind(msg.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save message")?;

        Ok(())
    }

    /// Retrieve up to `limit` messages for a chat, newest first.
    pub async fn recent_messages(&self, chat_id: &str, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, text, created_at
            FROM messages
            WHERE chat_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent messages")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(Message {
                id: row.try_get("id")?,
                chat_id: row.try_get("chat_id")?,
                text: row.try_get("text")?,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok(messages)
    }
}

// Introspection helpers for tests; no handler needs raw counts.
#[cfg(test)]
impl Store {
    pub async fn count_chats(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chats")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count chats")?;

        Ok(row.try_get("n")?)
    }

    pub async fn count_messages(&self, chat_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count messages")?;

        Ok(row.try_get("n")?)
    }
}
