//! Conversation identity: the unordered pair of participants.

use crate::error::{AppError, AppResult};
use crate::models::Message;
use uuid::Uuid;

/// Direction-independent key of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    low: Uuid,
    high: Uuid,
}

impl ConversationKey {
    pub fn participants(&self) -> (Uuid, Uuid) {
        (self.low, self.high)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}

/// A viewer and the counterpart they are talking to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationPair {
    viewer: Uuid,
    counterpart: Uuid,
}

impl ConversationPair {
    /// The counterpart does not have to exist; an unknown account simply
    /// yields an empty conversation.
    pub fn resolve(viewer: Uuid, counterpart: Uuid) -> AppResult<Self> {
        if viewer.is_nil() {
            return Err(AppError::Unauthorized);
        }
        if counterpart.is_nil() {
            return Err(AppError::BadRequest("counterpart id is empty".into()));
        }
        if viewer == counterpart {
            return Err(AppError::BadRequest(
                "cannot open a conversation with yourself".into(),
            ));
        }
        Ok(Self {
            viewer,
            counterpart,
        })
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    pub fn counterpart(&self) -> Uuid {
        self.counterpart
    }

    pub fn key(&self) -> ConversationKey {
        let (low, high) = if self.viewer <= self.counterpart {
            (self.viewer, self.counterpart)
        } else {
            (self.counterpart, self.viewer)
        };
        ConversationKey { low, high }
    }

    /// `{sender_id, receiver_id} = {viewer, counterpart}`
    pub fn contains(&self, message: &Message) -> bool {
        self.is_inbound(message) || self.is_outbound(message)
    }

    /// Sent by the counterpart to the viewer
    pub fn is_inbound(&self, message: &Message) -> bool {
        message.sender_id == self.counterpart && message.receiver_id == self.viewer
    }

    /// Sent by the viewer to the counterpart
    pub fn is_outbound(&self, message: &Message) -> bool {
        message.sender_id == self.viewer && message.receiver_id == self.counterpart
    }
}
