use crate::middleware::error_handling;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self.clone())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("history unavailable: {0}")]
    HistoryFetchFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("live delivery unavailable: {0}")]
    SubscriptionFailed(String),

    #[error("no conversation selected")]
    NoConversationSelected,

    #[error("session closed")]
    SessionClosed,

    #[error("internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::ServiceUnavailable(e.to_string())
            }
            sqlx::Error::RowNotFound => AppError::NotFound,
            _ => AppError::Database(e.to_string()),
        }
    }
}

impl From<change_feed::FeedError> for AppError {
    fn from(e: change_feed::FeedError) -> Self {
        AppError::SubscriptionFailed(e.to_string())
    }
}

impl AppError {
    /// Returns whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ServiceUnavailable(_)
                | AppError::HistoryFetchFailed(_)
                | AppError::SendFailed(_)
                | AppError::SubscriptionFailed(_)
                | AppError::Internal
        )
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::NotFound => 404,
            AppError::NoConversationSelected | AppError::SessionClosed => 409,
            AppError::SendFailed(_) => 502,
            AppError::ServiceUnavailable(_)
            | AppError::HistoryFetchFailed(_)
            | AppError::SubscriptionFailed(_) => 503,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal => 500,
        }
    }
}
