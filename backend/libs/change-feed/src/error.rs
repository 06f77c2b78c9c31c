//! Error types for change feed operations

use thiserror::Error;

/// Change feed errors
#[derive(Error, Debug)]
pub enum FeedError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Event serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filter cannot be expressed as a channel
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Feed cannot accept subscriptions right now
    #[error("Change feed unavailable: {0}")]
    Unavailable(String),
}

impl FeedError {
    /// Check if error is transient (re-subscribing may succeed)
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
            FeedError::Unavailable(_) => true,
            FeedError::Serialization(_) | FeedError::InvalidFilter(_) => false,
        }
    }
}
