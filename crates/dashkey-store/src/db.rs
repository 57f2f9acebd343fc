//! SQLite plaintext store (embedded, no external dependencies)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashkey_core::ports::PlaintextStore;
use dashkey_core::{
    ConversationId, DashkeyError, Result, ServerMessageId, StoredMessage, UserId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

fn storage_err(e: sqlx::Error) -> DashkeyError {
    DashkeyError::Storage(e.to_string())
}

pub struct SqlitePlaintextStore {
    pool: Arc<SqlitePool>,
}

impl SqlitePlaintextStore {
    pub async fn open(database_path: impl AsRef<Path>) -> Result<Self> {
        let database_path = database_path.as_ref();
        tracing::debug!("Opening SQLite plaintext store at: {}", database_path.display());

        if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                DashkeyError::Storage(format!(
                    "Failed to connect to SQLite database at {}: {}",
                    database_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;
        tracing::info!("Plaintext store ready at {}", database_path.display());

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        // NULL server ids do not collide under UNIQUE, so unacknowledged
        // sends can coexist
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_message_id INTEGER UNIQUE,
                conversation_id TEXT NOT NULL,
                sender_id INTEGER NOT NULL,
                receiver_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                timestamp DATETIME NOT NULL,
                sent_by_me BOOLEAN NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, timestamp)
            "#,
        )
        .execute(pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl PlaintextStore for SqlitePlaintextStore {
    async fn find_by_server_id(&self, id: ServerMessageId) -> Result<Option<StoredMessage>> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"
            SELECT server_message_id, conversation_id, sender_id, receiver_id,
                   text, timestamp, sent_by_me
            FROM messages WHERE server_message_id = ?1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_err)?;

        row.map(StoredMessage::try_from).transpose()
    }

    async fn save_message(&self, message: &StoredMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (server_message_id, conversation_id, sender_id, receiver_id,
                                  text, timestamp, sent_by_me)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(server_message_id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                sender_id = excluded.sender_id,
                receiver_id = excluded.receiver_id,
                text = excluded.text,
                timestamp = excluded.timestamp,
                sent_by_me = excluded.sent_by_me
            "#,
        )
        .bind(message.server_id.map(|id| id.0))
        .bind(message.conversation_id.to_string())
        .bind(message.sender_id.0)
        .bind(message.receiver_id.0)
        .bind(&message.text)
        .bind(message.timestamp)
        .bind(message.sent_by_me)
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn messages_for_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<StoredMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT server_message_id, conversation_id, sender_id, receiver_id,
                   text, timestamp, sent_by_me
            FROM messages WHERE conversation_id = ?1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(conversation.to_string())
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter().map(StoredMessage::try_from).collect()
    }

    async fn delete_conversation(&self, conversation: &ConversationId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = ?1")
            .bind(conversation.to_string())
            .execute(&*self.pool)
            .await
            .map_err(storage_err)?;

        Ok(result.rows_affected())
    }
}

// Helper struct for sqlx query_as
#[derive(sqlx::FromRow)]
struct MessageRow {
    server_message_id: Option<i64>,
    conversation_id: String,
    sender_id: i64,
    receiver_id: i64,
    text: String,
    timestamp: DateTime<Utc>,
    sent_by_me: bool,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = DashkeyError;

    fn try_from(r: MessageRow) -> Result<Self> {
        let conversation_id = r
            .conversation_id
            .parse::<ConversationId>()
            .map_err(|e| DashkeyError::Storage(e.to_string()))?;

        Ok(StoredMessage {
            server_id: r.server_message_id.map(ServerMessageId),
            conversation_id,
            sender_id: UserId(r.sender_id),
            receiver_id: UserId(r.receiver_id),
            text: r.text,
            timestamp: r.timestamp,
            sent_by_me: r.sent_by_me,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    async fn open_temp() -> (tempfile::TempDir, SqlitePlaintextStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlitePlaintextStore::open(dir.path().join("nested/messages.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let (_dir, store) = open_temp().await;
        let message = StoredMessage::authored(
            Some(ServerMessageId(10)),
            UserId(42),
            UserId(7),
            "hello",
            at(0),
        );
        store.save_message(&message).await.unwrap();

        let found = store.find_by_server_id(ServerMessageId(10)).await.unwrap();
        assert_eq!(found, Some(message));
        assert!(store.find_by_server_id(ServerMessageId(11)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_by_server_id() {
        let (_dir, store) = open_temp().await;
        let mut message =
            StoredMessage::authored(Some(ServerMessageId(1)), UserId(1), UserId(2), "v1", at(0));
        store.save_message(&message).await.unwrap();
        message.text = "v2".to_string();
        store.save_message(&message).await.unwrap();

        let conv = ConversationId::between(UserId(1), UserId(2));
        let all = store.messages_for_conversation(&conv).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "v2");
    }

    #[tokio::test]
    async fn test_conversation_order_and_delete() {
        let (_dir, store) = open_temp().await;
        let conv = ConversationId::between(UserId(1), UserId(2));

        for (id, minute, text) in [(Some(3), 30, "third"), (None, 10, "first"), (Some(2), 20, "second")] {
            let message =
                StoredMessage::authored(id.map(ServerMessageId), UserId(1), UserId(2), text, at(minute));
            store.save_message(&message).await.unwrap();
        }
        store
            .save_message(&StoredMessage::authored(None, UserId(1), UserId(3), "other", at(0)))
            .await
            .unwrap();

        let texts: Vec<String> = store
            .messages_for_conversation(&conv)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);

        assert_eq!(store.delete_conversation(&conv).await.unwrap(), 3);
        assert!(store.messages_for_conversation(&conv).await.unwrap().is_empty());
        let other = ConversationId::between(UserId(3), UserId(1));
        assert_eq!(store.messages_for_conversation(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.db");
        {
            let store = SqlitePlaintextStore::open(&path).await.unwrap();
            store
                .save_message(&StoredMessage::authored(
                    Some(ServerMessageId(5)),
                    UserId(1),
                    UserId(2),
                    "persisted",
                    at(0),
                ))
                .await
                .unwrap();
        }
        let store = SqlitePlaintextStore::open(&path).await.unwrap();
        let found = store.find_by_server_id(ServerMessageId(5)).await.unwrap().unwrap();
        assert_eq!(found.text, "persisted");
    }
}
