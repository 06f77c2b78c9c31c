//! The two directional subscriptions of a session.
//!
//! A change feed filter is a single equality predicate, so "rows where the
//! viewer is sender OR receiver" is rebuilt from two legs and narrowed to the
//! counterpart on the client.

use super::SessionState;
use crate::conversation::ConversationPair;
use crate::error::{AppError, AppResult};
use crate::models::Message;
use crate::reconciler::Source;
use change_feed::{callback, ChangeEvent, ChangeFeed, FeedCallback, RowFilter, SubscriptionHandle};
use std::sync::Weak;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    /// `receiver_id = viewer`, accepted when sent by the counterpart
    Inbound,
    /// `sender_id = viewer`, accepted when addressed to the counterpart.
    /// Keeps other sessions of the same viewer in sync.
    Outbound,
}

impl Leg {
    pub fn filter(self, pair: &ConversationPair) -> RowFilter {
        match self {
            Leg::Inbound => RowFilter::eq(Message::TABLE, "receiver_id", pair.viewer()),
            Leg::Outbound => RowFilter::eq(Message::TABLE, "sender_id", pair.viewer()),
        }
    }

    pub fn source(self) -> Source {
        match self {
            Leg::Inbound => Source::InboundLeg,
            Leg::Outbound => Source::OutboundLeg,
        }
    }
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Leg::Inbound => write!(f, "inbound"),
            Leg::Outbound => write!(f, "outbound"),
        }
    }
}

/// Both open handles; dropping this releases them.
#[derive(Debug)]
pub(super) struct Legs {
    inbound: SubscriptionHandle,
    outbound: SubscriptionHandle,
}

impl Legs {
    pub(super) async fn open(
        feed: &dyn ChangeFeed,
        state: Weak<Mutex<SessionState>>,
        epoch: u64,
        pair: ConversationPair,
    ) -> AppResult<Self> {
        // On a partial failure the handle that did open is dropped, and so released.
        let (inbound, outbound) = tokio::try_join!(
            feed.subscribe(
                Leg::Inbound.filter(&pair),
                deliver(state.clone(), epoch, Leg::Inbound)
            ),
            feed.subscribe(
                Leg::Outbound.filter(&pair),
                deliver(state, epoch, Leg::Outbound)
            ),
        )
        .map_err(|e| AppError::SubscriptionFailed(e.to_string()))?;

        debug!(
            viewer_id = %pair.viewer(),
            counterpart_id = %pair.counterpart(),
            epoch,
            "Feed legs established"
        );

        Ok(Self { inbound, outbound })
    }

    pub(super) fn release(self) {
        self.inbound.release();
        self.outbound.release();
    }
}

fn deliver(state: Weak<Mutex<SessionState>>, epoch: u64, leg: Leg) -> FeedCallback {
    callback(move |event: ChangeEvent| {
        let state = state.clone();
        async move {
            let Some(state) = state.upgrade() else {
                debug!(leg = %leg, event_id = %event.event_id, "Session gone; event dropped");
                return;
            };

            let message = match Message::from_change_event(&event) {
                Ok(m) => m,
                Err(e) => {
                    warn!(leg = %leg, event_id = %event.event_id, error = %e, "Malformed message row on change feed");
                    return;
                }
            };

            state.lock().await.apply(epoch, message, leg.source());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_leg_filters_use_viewer() {
        let (viewer, counterpart) = (Uuid::new_v4(), Uuid::new_v4());
        let pair = ConversationPair::resolve(viewer, counterpart).unwrap();

        assert_eq!(
            Leg::Inbound.filter(&pair),
            RowFilter::eq("messages", "receiver_id", viewer)
        );
        assert_eq!(
            Leg::Outbound.filter(&pair),
            RowFilter::eq("messages", "sender_id", viewer)
        );
    }
}
