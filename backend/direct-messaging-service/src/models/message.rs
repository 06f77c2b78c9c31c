use crate::error::{AppError, AppResult};
use change_feed::ChangeEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message row as stored and as carried by the change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub const TABLE: &'static str = "messages";

    /// Columns the change feed can filter on
    pub const FEED_COLUMNS: [&'static str; 2] = ["sender_id", "receiver_id"];

    /// Insert event carrying this row
    pub fn to_change_event(&self) -> Result<ChangeEvent, serde_json::Error> {
        Ok(ChangeEvent::insert(Self::TABLE, serde_json::to_value(self)?))
    }

    /// Decode the row of an insert event on the messages table
    pub fn from_change_event(event: &ChangeEvent) -> Result<Self, serde_json::Error> {
        serde_json::from_value(event.row.clone())
    }

    pub fn is_from(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id
    }
}

/// Validated input for a write; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
}

impl NewMessage {
    pub fn parse(sender_id: Uuid, receiver_id: Uuid, raw: &str) -> AppResult<Self> {
        let content = raw.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("message content is empty".into()));
        }
        if sender_id == receiver_id {
            return Err(AppError::BadRequest(
                "sender and receiver must be different users".into(),
            ));
        }
        Ok(Self {
            sender_id,
            receiver_id,
            content: content.to_string(),
        })
    }

    pub fn sender_id(&self) -> Uuid {
        self.sender_id
    }

    pub fn receiver_id(&self) -> Uuid {
        self.receiver_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_content() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let msg = NewMessage::parse(a, b, "  hello \n").unwrap();
        assert_eq!(msg.content(), "hello");
        assert_eq!(msg.sender_id(), a);
        assert_eq!(msg.receiver_id(), b);
    }

    #[test]
    fn test_parse_rejects_blank_and_self_messages() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(NewMessage::parse(a, b, "   "), Err(AppError::BadRequest(_))));
        assert!(matches!(NewMessage::parse(a, a, "hi"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_change_event_carries_full_row() {
        let msg = Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            content: "hi".into(),
            created_at: Utc::now(),
        };
        let event = msg.to_change_event().unwrap();

        assert_eq!(event.table, Message::TABLE);
        assert_eq!(event.column_value("sender_id"), Some(msg.sender_id.to_string()));
        assert_eq!(Message::from_change_event(&event).unwrap(), msg);
    }
}
