use crate::{ChangeEvent, ChangeFeed, FeedCallback, Result, RowFilter, SubscriptionHandle, SubscriptionId};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Change feed backed by Redis Pub/Sub.
///
/// Publishing fans a row out to one channel per registered filter column of
/// its table. Each subscription owns a dedicated pub/sub connection and a
/// background task; releasing the handle aborts the task.
#[derive(Clone)]
pub struct RedisChangeFeed {
    client: Client,
    publisher: ConnectionManager,
    prefix: String,
    // table -> columns that subscribers may filter on
    filter_columns: HashMap<String, Vec<String>>,
}

impl RedisChangeFeed {
    /// Default channel prefix
    pub const DEFAULT_PREFIX: &'static str = "feed";

    /// Create a feed on `redis_url` publishing under `prefix`
    pub async fn new(redis_url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;

        Ok(Self {
            client,
            publisher,
            prefix: prefix.into(),
            filter_columns: HashMap::new(),
        })
    }

    /// Register the columns of `table` that subscribers can filter on
    pub fn with_filter_columns(mut self, table: &str, columns: &[&str]) -> Self {
        self.filter_columns.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn publish(&self, event: ChangeEvent) -> Result<usize> {
        let Some(columns) = self.filter_columns.get(&event.table) else {
            warn!(table = %event.table, "No filter columns registered; event not published");
            return Ok(0);
        };

        let payload = serde_json::to_string(&event)?;
        let mut conn = self.publisher.clone();
        let mut receivers = 0usize;

        for channel in event.channels(&self.prefix, columns) {
            let count: usize = conn.publish(&channel, &payload).await?;
            debug!(event_id = %event.event_id, channel = %channel, receivers = count, "Published change event");
            receivers += count;
        }

        Ok(receivers)
    }

    async fn subscribe(
        &self,
        filter: RowFilter,
        callback: FeedCallback,
    ) -> Result<SubscriptionHandle> {
        filter.validate()?;

        let channel = filter.channel(&self.prefix);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        info!(channel = %channel, "Subscribed to change feed");

        let id = SubscriptionId::new();
        let active = Arc::new(AtomicBool::new(true));
        let task_active = active.clone();
        let task_filter = filter.clone();

        let task = tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                if !task_active.load(Ordering::Acquire) {
                    break;
                }

                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = ?e, "Failed to get change event payload");
                        continue;
                    }
                };

                let event: ChangeEvent = match serde_json::from_str(&payload) {
                    Ok(ev) => ev,
                    Err(e) => {
                        error!(error = ?e, payload = %payload, "Failed to deserialize change event");
                        continue;
                    }
                };

                // Channel naming is the primary filter; re-check the row anyway.
                if !task_filter.matches(&event) {
                    debug!(event_id = %event.event_id, filter = %task_filter, "Dropping non-matching event");
                    continue;
                }

                callback(event).await;
            }

            if task_active.load(Ordering::Acquire) {
                warn!(filter = %task_filter, "Change feed subscription ended");
            }
        });

        Ok(SubscriptionHandle::new(id, filter, active, Some(task)))
    }
}
