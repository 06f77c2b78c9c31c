use super::MessageStore;
use crate::conversation::ConversationPair;
use crate::error::{AppError, AppResult};
use crate::models::{Message, NewMessage, Profile};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

// PostgreSQL error codes surfaced as validation failures
const CHECK_VIOLATION: &str = "23514";
const NOT_NULL_VIOLATION: &str = "23502";

#[derive(Clone)]
pub struct PgMessageStore {
    db: PgPool,
}

impl PgMessageStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_insert_error(e: sqlx::Error) -> AppError {
    if let Some(db_err) = e.as_database_error() {
        if let Some(code) = db_err.code() {
            if code == CHECK_VIOLATION || code == NOT_NULL_VIOLATION {
                return AppError::BadRequest(db_err.message().to_string());
            }
        }
    }
    e.into()
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn fetch_history(&self, pair: &ConversationPair) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, sender_id, receiver_id, content, created_at
            FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(pair.viewer())
        .bind(pair.counterpart())
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn insert(&self, message: NewMessage) -> AppResult<Message> {
        let row = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (sender_id, receiver_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, sender_id, receiver_id, content, created_at
            "#,
        )
        .bind(message.sender_id())
        .bind(message.receiver_id())
        .bind(message.content())
        .fetch_one(&self.db)
        .await
        .map_err(map_insert_error)?;

        tracing::debug!(
            message_id = %row.id,
            sender_id = %row.sender_id,
            receiver_id = %row.receiver_id,
            "Message stored"
        );

        Ok(row)
    }

    async fn find_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let profile =
            sqlx::query_as::<_, Profile>("SELECT id, full_name FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(profile)
    }
}
