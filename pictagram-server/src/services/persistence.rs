//! Persistence gateway for conversations, messages, and read-state.
//!
//! The relay treats storage as a fallible request/response collaborator
//! behind the [`PersistenceGateway`] trait; the Postgres implementation
//! lives here, and tests substitute an in-memory fake.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use shared::models::message::CreateMessageRequest;
use shared::models::{Conversation, Message, Timestamp};

/// Errors produced by persistence gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The underlying database call failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The gateway is not reachable (e.g. the server runs without a
    /// configured database).
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
    /// The request referenced an entity that does not exist.
    #[error("{0}")]
    NotFound(String),
}

/// Durable store interface the relay and REST handlers depend on.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Lists the user ids participating in a conversation.
    async fn get_conversation_participants(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<i64>, GatewayError>;

    /// Persists a new message and returns the stored row.
    async fn create_message(&self, request: CreateMessageRequest)
    -> Result<Message, GatewayError>;

    /// Bumps a conversation's last-message timestamp to now.
    async fn update_conversation_last_message_time(
        &self,
        conversation_id: i64,
    ) -> Result<(), GatewayError>;

    /// Marks a message read and returns the updated row, or `None` when
    /// the message does not exist. The read flag never resets to false.
    async fn mark_message_as_read(&self, message_id: i64)
    -> Result<Option<Message>, GatewayError>;

    /// Returns the direct conversation between two users, creating it on
    /// first use.
    async fn get_or_create_direct_conversation(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<Conversation, GatewayError>;

    /// Lists a conversation's messages in creation order. This is the
    /// polling fallback for recipients that were offline during relay.
    async fn get_conversation_messages(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<Message>, GatewayError>;
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    sender_id: i64,
    text: String,
    read: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            text: row.text,
            read: row.read,
            created_at: Timestamp(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: i64,
    last_message_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            last_message_at: row.last_message_at.map(Timestamp),
            created_at: Timestamp(row.created_at),
        }
    }
}

/// Postgres-backed persistence gateway.
#[derive(Debug, Clone)]
pub struct PgPersistenceGateway {
    pool: PgPool,
}

impl PgPersistenceGateway {
    /// Creates a gateway over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for PgPersistenceGateway {
    async fn get_conversation_participants(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<i64>, GatewayError> {
        let participants = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }

    async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> Result<Message, GatewayError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"INSERT INTO messages (conversation_id, sender_id, text)
               VALUES ($1, $2, $3)
               RETURNING id, conversation_id, sender_id, text, "read", created_at"#,
        )
        .bind(request.conversation_id)
        .bind(request.sender_id)
        .bind(&request.text)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_conversation_last_message_time(
        &self,
        conversation_id: i64,
    ) -> Result<(), GatewayError> {
        sqlx::query("UPDATE conversations SET last_message_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_message_as_read(
        &self,
        message_id: i64,
    ) -> Result<Option<Message>, GatewayError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"UPDATE messages SET "read" = TRUE
               WHERE id = $1
               RETURNING id, conversation_id, sender_id, text, "read", created_at"#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn get_or_create_direct_conversation(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<Conversation, GatewayError> {
        let existing = sqlx::query_as::<_, ConversationRow>(
            "SELECT c.id, c.last_message_at, c.created_at
             FROM conversations c
             JOIN conversation_participants pa ON pa.conversation_id = c.id AND pa.user_id = $1
             JOIN conversation_participants pb ON pb.conversation_id = c.id AND pb.user_id = $2
             LIMIT 1",
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(row.into());
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ConversationRow>(
            "INSERT INTO conversations DEFAULT VALUES
             RETURNING id, last_message_at, created_at",
        )
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id)
             VALUES ($1, $2), ($1, $3)",
        )
        .bind(row.id)
        .bind(user_a)
        .bind(user_b)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn get_conversation_messages(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<Message>, GatewayError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, conversation_id, sender_id, text, "read", created_at
               FROM messages
               WHERE conversation_id = $1
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Gateway used when the server starts without a database; every call
/// reports unavailability so handlers degrade to typed failures instead
/// of panicking.
#[derive(Debug, Default, Clone)]
pub struct OfflineGateway;

impl OfflineGateway {
    fn unavailable() -> GatewayError {
        GatewayError::Unavailable("no database configured".to_string())
    }
}

#[async_trait]
impl PersistenceGateway for OfflineGateway {
    async fn get_conversation_participants(
        &self,
        _conversation_id: i64,
    ) -> Result<Vec<i64>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn create_message(
        &self,
        _request: CreateMessageRequest,
    ) -> Result<Message, GatewayError> {
        Err(Self::unavailable())
    }

    async fn update_conversation_last_message_time(
        &self,
        _conversation_id: i64,
    ) -> Result<(), GatewayError> {
        Err(Self::unavailable())
    }

    async fn mark_message_as_read(
        &self,
        _message_id: i64,
    ) -> Result<Option<Message>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn get_or_create_direct_conversation(
        &self,
        _user_a: i64,
        _user_b: i64,
    ) -> Result<Conversation, GatewayError> {
        Err(Self::unavailable())
    }

    async fn get_conversation_messages(
        &self,
        _conversation_id: i64,
    ) -> Result<Vec<Message>, GatewayError> {
        Err(Self::unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_gateway_reports_unavailable() {
        let gateway = OfflineGateway;
        let result = gateway.get_conversation_participants(1).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[test]
    fn gateway_errors_render_their_context() {
        let err = GatewayError::Unavailable("no database configured".to_string());
        assert_eq!(
            err.to_string(),
            "persistence unavailable: no database configured"
        );

        let err = GatewayError::NotFound("conversation 9 not found".to_string());
        assert_eq!(err.to_string(), "conversation 9 not found");
    }
}
