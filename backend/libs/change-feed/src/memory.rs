//! In-process change feed
//!
//! Same contract as the Redis backing without a broker. Callbacks run
//! sequentially on the publishing task, so a publish returns only after every
//! matching subscriber has processed the event.

use crate::{ChangeEvent, ChangeFeed, FeedCallback, FeedError, Result, RowFilter, SubscriptionHandle, SubscriptionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct Subscriber {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
    callback: FeedCallback,
}

#[derive(Clone, Default)]
pub struct InMemoryChangeFeed {
    // filter -> subscribers
    inner: Arc<RwLock<HashMap<RowFilter, Vec<Subscriber>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make new subscriptions fail until reset. Existing ones keep delivering.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Active subscriptions registered for `filter`
    pub async fn subscriber_count(&self, filter: &RowFilter) -> usize {
        let guard = self.inner.read().await;
        guard
            .get(filter)
            .map(|subs| subs.iter().filter(|s| s.active.load(Ordering::Acquire)).count())
            .unwrap_or(0)
    }

    /// Active subscriptions across all filters
    pub async fn total_subscribers(&self) -> usize {
        let guard = self.inner.read().await;
        guard
            .values()
            .flatten()
            .filter(|s| s.active.load(Ordering::Acquire))
            .count()
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn publish(&self, event: ChangeEvent) -> Result<usize> {
        // Collect targets first; callbacks must run without the registry lock
        // because they may release subscriptions themselves.
        let targets: Vec<(SubscriptionId, Arc<AtomicBool>, FeedCallback)> = {
            let mut guard = self.inner.write().await;
            guard.retain(|_, subs| {
                subs.retain(|s| s.active.load(Ordering::Acquire));
                !subs.is_empty()
            });
            guard
                .iter()
                .filter(|(filter, _)| filter.matches(&event))
                .flat_map(|(_, subs)| subs.iter())
                .map(|s| (s.id, s.active.clone(), s.callback.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, active, callback) in targets {
            if !active.load(Ordering::Acquire) {
                debug!(subscription_id = %id, "Skipping released subscription");
                continue;
            }
            callback(event.clone()).await;
            delivered += 1;
        }

        debug!(
            event_id = %event.event_id,
            table = %event.table,
            delivered,
            "Change event published"
        );

        Ok(delivered)
    }

    async fn subscribe(
        &self,
        filter: RowFilter,
        callback: FeedCallback,
    ) -> Result<SubscriptionHandle> {
        filter.validate()?;
        if self.unavailable.load(Ordering::Acquire) {
            return Err(FeedError::Unavailable(format!(
                "cannot subscribe to {}",
                filter
            )));
        }

        let id = SubscriptionId::new();
        let active = Arc::new(AtomicBool::new(true));

        let mut guard = self.inner.write().await;
        guard.entry(filter.clone()).or_default().push(Subscriber {
            id,
            active: active.clone(),
            callback,
        });

        debug!(subscription_id = %id, filter = %filter, "Subscribed to change feed");

        Ok(SubscriptionHandle::new(id, filter, active, None))
    }
}
