//! Row-level change feed over Redis Pub/Sub
//!
//! Notifies subscribers when a row is durably written, carrying the full row.
//!
//! # Architecture
//!
//! ```text
//! Writer (direct-messaging-service):
//!   1. INSERT INTO messages ... RETURNING *
//!   2. Publish the row once per filterable column:
//!      PUBLISH feed:messages:sender_id=eq.<A>   {"table": "messages", "row": {...}}
//!      PUBLISH feed:messages:receiver_id=eq.<B> {"table": "messages", "row": {...}}
//!      ↓
//! Redis Pub/Sub (at-least-once from the reader's point of view)
//!      ↓
//! Subscriber holding RowFilter(messages, receiver_id = B):
//!   3. Receive event, re-check the filter, invoke the registered callback
//! ```
//!
//! A filter is a single column-equality predicate. Symmetric predicates
//! ("sender is me OR receiver is me") are built from two subscriptions.
//!
//! # Example
//!
//! ```no_run
//! use change_feed::{callback, ChangeFeed, RedisChangeFeed, RowFilter};
//!
//! # async fn example() -> change_feed::Result<()> {
//! let feed = RedisChangeFeed::new("redis://localhost:6379", "feed")
//!     .await?
//!     .with_filter_columns("messages", &["sender_id", "receiver_id"]);
//!
//! let handle = feed
//!     .subscribe(
//!         RowFilter::eq("messages", "receiver_id", "8d6f..."),
//!         callback(|event| async move {
//!             println!("new row: {}", event.row);
//!         }),
//!     )
//!     .await?;
//!
//! // Stops delivery; dropping the handle does the same.
//! handle.release();
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

mod error;
mod memory;
mod redis_feed;

pub use error::FeedError;
pub use memory::InMemoryChangeFeed;
pub use redis_feed::RedisChangeFeed;

pub type Result<T> = std::result::Result<T, FeedError>;

/// Single column-equality predicate over one table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowFilter {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl RowFilter {
    /// `column = value` on `table`
    pub fn eq(table: impl Into<String>, column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// Reject filters that cannot be mapped onto a channel name.
    pub fn validate(&self) -> Result<()> {
        for (name, part) in [("table", &self.table), ("column", &self.column)] {
            if part.is_empty() {
                return Err(FeedError::InvalidFilter(format!("{name} must not be empty")));
            }
            if part.contains(':') || part.contains('=') || part.contains('*') {
                return Err(FeedError::InvalidFilter(format!(
                    "{name} contains a reserved character: {part}"
                )));
            }
        }
        if self.value.is_empty() {
            return Err(FeedError::InvalidFilter("value must not be empty".into()));
        }
        Ok(())
    }

    /// Pub/Sub channel carrying rows that match this filter
    pub fn channel(&self, prefix: &str) -> String {
        format!("{}:{}:{}", prefix, self.table, self)
    }

    /// Whether the event's row satisfies the predicate
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table
            && event
                .column_value(&self.column)
                .is_some_and(|value| value == self.value)
    }
}

impl std::fmt::Display for RowFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// A newly written row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: Uuid,
    pub table: String,
    pub row: JsonValue,
    pub committed_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Insert event for `row` on `table`
    pub fn insert(table: impl Into<String>, row: JsonValue) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            table: table.into(),
            row,
            committed_at: Utc::now(),
        }
    }

    /// Column value rendered the way filters compare it
    pub fn column_value(&self, column: &str) -> Option<String> {
        match self.row.get(column)? {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// One channel per filterable column present in the row
    pub fn channels(&self, prefix: &str, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .filter_map(|column| {
                self.column_value(column)
                    .map(|value| RowFilter::eq(self.table.clone(), column.clone(), value))
            })
            .map(|filter| filter.channel(prefix))
            .collect()
    }
}

/// Callback owned by exactly one subscription
pub type FeedCallback = Arc<dyn Fn(ChangeEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`FeedCallback`].
pub fn callback<F, Fut>(f: F) -> FeedCallback
where
    F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Publish/subscribe over newly written rows
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Fan the event out to every matching subscription.
    ///
    /// Returns the number of deliveries the backing reported.
    async fn publish(&self, event: ChangeEvent) -> Result<usize>;

    /// Register `callback` for every future event matching `filter`.
    async fn subscribe(&self, filter: RowFilter, callback: FeedCallback)
        -> Result<SubscriptionHandle>;
}

/// Unique identifier for one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One open listener.
///
/// Delivery stops when the handle is released or dropped, whichever comes
/// first. Backings check the shared flag before every callback invocation.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    filter: RowFilter,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: SubscriptionId,
        filter: RowFilter,
        active: Arc<AtomicBool>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            id,
            filter,
            active,
            task,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn filter(&self) -> &RowFilter {
        &self.filter
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery for this subscription
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if was_active {
            debug!(subscription_id = %self.id, filter = %self.filter, "Subscription released");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_display_and_channel() {
        let filter = RowFilter::eq("messages", "receiver_id", "abc");
        assert_eq!(filter.to_string(), "receiver_id=eq.abc");
        assert_eq!(filter.channel("feed"), "feed:messages:receiver_id=eq.abc");
    }

    #[test]
    fn test_filter_validation() {
        assert!(RowFilter::eq("messages", "receiver_id", "abc").validate().is_ok());
        assert!(RowFilter::eq("", "receiver_id", "abc").validate().is_err());
        assert!(RowFilter::eq("messages", "a:b", "abc").validate().is_err());
        assert!(RowFilter::eq("messages", "receiver_id", "").validate().is_err());
    }

    #[test]
    fn test_filter_matches_only_same_table_and_value() {
        let event = ChangeEvent::insert("messages", json!({"receiver_id": "b", "sender_id": "a"}));

        assert!(RowFilter::eq("messages", "receiver_id", "b").matches(&event));
        assert!(!RowFilter::eq("messages", "receiver_id", "a").matches(&event));
        assert!(!RowFilter::eq("profiles", "receiver_id", "b").matches(&event));
        assert!(!RowFilter::eq("messages", "missing", "b").matches(&event));
    }

    #[test]
    fn test_event_channels_per_column() {
        let event = ChangeEvent::insert("messages", json!({"receiver_id": "b", "sender_id": "a"}));
        let columns = vec!["sender_id".to_string(), "receiver_id".to_string()];

        assert_eq!(
            event.channels("feed", &columns),
            vec![
                "feed:messages:sender_id=eq.a".to_string(),
                "feed:messages:receiver_id=eq.b".to_string(),
            ]
        );
    }

    #[test]
    fn test_numeric_column_value() {
        let event = ChangeEvent::insert("messages", json!({"id": 42}));
        assert_eq!(event.column_value("id"), Some("42".to_string()));
    }

    #[test]
    fn test_handle_release_clears_flag() {
        let active = Arc::new(AtomicBool::new(true));
        let handle = SubscriptionHandle::new(
            SubscriptionId::new(),
            RowFilter::eq("messages", "sender_id", "a"),
            active.clone(),
            None,
        );
        assert!(handle.is_active());

        handle.release();
        assert!(!active.load(Ordering::Acquire));
    }

    #[test]
    fn test_handle_drop_clears_flag() {
        let active = Arc::new(AtomicBool::new(true));
        {
            let _handle = SubscriptionHandle::new(
                SubscriptionId::new(),
                RowFilter::eq("messages", "sender_id", "a"),
                active.clone(),
                None,
            );
        }
        assert!(!active.load(Ordering::Acquire));
    }
}
