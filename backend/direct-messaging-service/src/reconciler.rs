//! Delivery reconciliation
//!
//! Messages reach a client from three places that race and overlap: the
//! history fetch, the return value of its own send, and the two change feed
//! legs. The reconciler folds them into one view that is unique by `id` and
//! ascending by `created_at`. Equal timestamps keep the order they were
//! observed in.

use crate::conversation::ConversationPair;
use crate::models::Message;
use std::collections::HashSet;
use uuid::Uuid;

/// Where a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    History,
    LocalSend,
    InboundLeg,
    OutboundLeg,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::History => write!(f, "history"),
            Source::LocalSend => write!(f, "local_send"),
            Source::InboundLeg => write!(f, "inbound_leg"),
            Source::OutboundLeg => write!(f, "outbound_leg"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted { index: usize },
    /// Same `id` already in the view; incoming copy discarded
    Duplicate,
    /// Belongs to a different conversation (or the wrong leg)
    Foreign,
}

/// Ordered, id-unique list of messages
#[derive(Debug, Clone, Default)]
pub struct ConversationView {
    messages: Vec<Message>,
    ids: HashSet<Uuid>,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether `message` should render on the viewer's side
    pub fn is_own(message: &Message, viewer: Uuid) -> bool {
        message.is_from(viewer)
    }

    /// Idempotent insert keeping `created_at` order
    pub fn merge(&mut self, message: Message) -> MergeOutcome {
        if !self.ids.insert(message.id) {
            return MergeOutcome::Duplicate;
        }
        // After every entry with an equal or earlier timestamp.
        let index = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(index, message);
        MergeOutcome::Inserted { index }
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Gatekeeper in front of one conversation's view
#[derive(Debug, Clone)]
pub struct DeliveryReconciler {
    pair: ConversationPair,
    view: ConversationView,
}

impl DeliveryReconciler {
    pub fn new(pair: ConversationPair) -> Self {
        Self {
            pair,
            view: ConversationView::new(),
        }
    }

    pub fn pair(&self) -> &ConversationPair {
        &self.pair
    }

    pub fn view(&self) -> &ConversationView {
        &self.view
    }

    /// Admit `message` from `source` into the view.
    ///
    /// Each leg only accepts its own direction: the inbound leg carries rows
    /// addressed to the viewer, so it is only trusted for rows the counterpart
    /// sent, and vice versa.
    pub fn accept(&mut self, message: Message, source: Source) -> MergeOutcome {
        let belongs = match source {
            Source::History | Source::LocalSend => self.pair.contains(&message),
            Source::InboundLeg => self.pair.is_inbound(&message),
            Source::OutboundLeg => self.pair.is_outbound(&message),
        };
        if !belongs {
            tracing::debug!(
                message_id = %message.id,
                source = %source,
                conversation = %self.pair.key(),
                "Ignoring message from another conversation"
            );
            return MergeOutcome::Foreign;
        }

        let outcome = self.view.merge(message);
        if outcome == MergeOutcome::Duplicate {
            tracing::debug!(source = %source, "Duplicate delivery discarded");
        }
        outcome
    }

    /// Admit a batch, returning how many were new
    pub fn accept_all<I>(&mut self, messages: I, source: Source) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        messages
            .into_iter()
            .map(|m| self.accept(m, source))
            .filter(|outcome| matches!(outcome, MergeOutcome::Inserted { .. }))
            .count()
    }
}
