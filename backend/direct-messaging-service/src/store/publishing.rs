use super::MessageStore;
use crate::conversation::ConversationPair;
use crate::error::AppResult;
use crate::models::{Message, NewMessage, Profile};
use async_trait::async_trait;
use change_feed::ChangeFeed;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Store decorator that announces every durable insert on the change feed.
///
/// The row is published after the inner store has returned it. A publish
/// failure does not fail the write: the writer already holds the row and
/// other viewers recover it on their next history fetch.
pub struct PublishingStore<S> {
    inner: S,
    feed: Arc<dyn ChangeFeed>,
}

impl<S: MessageStore> PublishingStore<S> {
    pub fn new(inner: S, feed: Arc<dyn ChangeFeed>) -> Self {
        Self { inner, feed }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: MessageStore> MessageStore for PublishingStore<S> {
    async fn fetch_history(&self, pair: &ConversationPair) -> AppResult<Vec<Message>> {
        self.inner.fetch_history(pair).await
    }

    async fn insert(&self, message: NewMessage) -> AppResult<Message> {
        let row = self.inner.insert(message).await?;

        match row.to_change_event() {
            Ok(event) => match self.feed.publish(event).await {
                Ok(delivered) => {
                    debug!(message_id = %row.id, delivered, "Insert announced on change feed")
                }
                Err(e) => {
                    warn!(message_id = %row.id, error = %e, "Failed to publish insert to change feed")
                }
            },
            Err(e) => warn!(message_id = %row.id, error = %e, "Failed to encode change event"),
        }

        Ok(row)
    }

    async fn find_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        self.inner.find_profile(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMessageStore;
    use change_feed::{callback, InMemoryChangeFeed, RowFilter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_insert_publishes_row() {
        let feed = InMemoryChangeFeed::new();
        let store = PublishingStore::new(InMemoryMessageStore::new(), Arc::new(feed.clone()));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let _handle = feed
            .subscribe(
                RowFilter::eq(Message::TABLE, "receiver_id", b),
                callback(move |_event| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .await
            .unwrap();

        store.insert(NewMessage::parse(a, b, "hello").unwrap()).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner().all_messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_publishes_nothing() {
        let feed = InMemoryChangeFeed::new();
        let inner = InMemoryMessageStore::new();
        inner.set_unavailable(true);
        let store = PublishingStore::new(inner, Arc::new(feed.clone()));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let _handle = feed
            .subscribe(
                RowFilter::eq(Message::TABLE, "sender_id", a),
                callback(move |_event| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .await
            .unwrap();

        assert!(store.insert(NewMessage::parse(a, b, "hello").unwrap()).await.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
