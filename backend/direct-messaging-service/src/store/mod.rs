//! Message store access
//!
//! The store is the single source of truth for messages. It assigns `id` and
//! `created_at` at write time and returns the persisted row with the write.

mod memory;
mod postgres;
mod publishing;

pub use memory::InMemoryMessageStore;
pub use postgres::PgMessageStore;
pub use publishing::PublishingStore;

use crate::conversation::ConversationPair;
use crate::error::AppResult;
use crate::models::{Message, NewMessage, Profile};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Every message of the pair, either direction, ascending by `created_at`
    async fn fetch_history(&self, pair: &ConversationPair) -> AppResult<Vec<Message>>;

    /// Persist one message and return the stored row
    async fn insert(&self, message: NewMessage) -> AppResult<Message>;

    /// Public profile of `user_id`, `None` when there is no such account
    async fn find_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>>;
}
