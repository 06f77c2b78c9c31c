use super::MessageStore;
use crate::conversation::ConversationPair;
use crate::error::{AppError, AppResult};
use crate::models::{Message, NewMessage, Profile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct StoreInner {
    // write order
    rows: Vec<Message>,
    profiles: HashMap<Uuid, Profile>,
    last_created_at: Option<DateTime<Utc>>,
}

/// Process-local store with the same write semantics as PostgreSQL.
///
/// `created_at` never goes backwards in write order.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    inner: Arc<RwLock<StoreInner>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store; every call fails until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    pub async fn add_profile(&self, profile: Profile) {
        let mut guard = self.inner.write().await;
        guard.profiles.insert(profile.id, profile);
    }

    /// Insert a fully formed row as if it had been written earlier
    pub async fn seed(&self, message: Message) {
        let mut guard = self.inner.write().await;
        guard.last_created_at = guard.last_created_at.max(Some(message.created_at));
        guard.rows.push(message);
    }

    /// Every stored row in write order
    pub async fn all_messages(&self) -> Vec<Message> {
        self.inner.read().await.rows.clone()
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(AppError::ServiceUnavailable(
                "message store unreachable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn fetch_history(&self, pair: &ConversationPair) -> AppResult<Vec<Message>> {
        self.check_available()?;

        let guard = self.inner.read().await;
        let mut rows: Vec<Message> = guard
            .rows
            .iter()
            .filter(|m| pair.contains(m))
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    async fn insert(&self, message: NewMessage) -> AppResult<Message> {
        self.check_available()?;

        let mut guard = self.inner.write().await;
        let now = Utc::now();
        let created_at = guard.last_created_at.map_or(now, |last| last.max(now));

        let row = Message {
            id: Uuid::new_v4(),
            sender_id: message.sender_id(),
            receiver_id: message.receiver_id(),
            content: message.content().to_string(),
            created_at,
        };
        guard.last_created_at = Some(created_at);
        guard.rows.push(row.clone());

        Ok(row)
    }

    async fn find_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        self.check_available()?;
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_id_and_monotonic_time() {
        let store = InMemoryMessageStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.insert(NewMessage::parse(a, b, "one").unwrap()).await.unwrap();
        let second = store.insert(NewMessage::parse(b, a, "two").unwrap()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.created_at <= second.created_at);
        assert_eq!(store.all_messages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_history_is_scoped_to_pair() {
        let store = InMemoryMessageStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        store.insert(NewMessage::parse(a, b, "ab").unwrap()).await.unwrap();
        store.insert(NewMessage::parse(c, a, "ca").unwrap()).await.unwrap();
        store.insert(NewMessage::parse(b, a, "ba").unwrap()).await.unwrap();

        let pair = ConversationPair::resolve(a, b).unwrap();
        let history = store.fetch_history(&pair).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["ab", "ba"]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryMessageStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.set_unavailable(true);

        let pair = ConversationPair::resolve(a, b).unwrap();
        assert!(store.fetch_history(&pair).await.is_err());
        assert!(store.insert(NewMessage::parse(a, b, "x").unwrap()).await.is_err());
        assert!(store.find_profile(b).await.is_err());
        assert!(store.all_messages().await.is_empty());
    }
}
