use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::BadRequest(_) => ("validation_error", "INVALID_REQUEST"),
        AppError::Unauthorized => ("authentication_error", "VIEWER_REQUIRED"),
        AppError::NotFound => ("not_found_error", "NOT_FOUND"),
        AppError::NoConversationSelected => ("conflict_error", "NO_CONVERSATION_SELECTED"),
        AppError::SessionClosed => ("conflict_error", "SESSION_CLOSED"),
        AppError::HistoryFetchFailed(_) => ("server_error", "HISTORY_UNAVAILABLE"),
        AppError::SendFailed(_) => ("server_error", "SEND_FAILED"),
        AppError::SubscriptionFailed(_) => ("server_error", "SUBSCRIPTION_FAILED"),
        AppError::ServiceUnavailable(_) => ("server_error", "SERVICE_UNAVAILABLE"),
        AppError::Database(_) => ("server_error", "DATABASE_ERROR"),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            ("server_error", "INTERNAL_SERVER_ERROR")
        }
    };

    // Internal details stay in the logs.
    let message = match err {
        AppError::Database(_) | AppError::Config(_) | AppError::StartServer(_) => {
            AppError::Internal.to_string()
        }
        _ => err.to_string(),
    };

    let response = ErrorResponse {
        error: status
            .canonical_reason()
            .unwrap_or("Error")
            .to_string(),
        message,
        status: status.as_u16(),
        error_type: error_type.to_string(),
        code: code.to_string(),
    };

    (status, response)
}

pub fn into_response(err: AppError) -> HttpResponse {
    if err.status_code() >= 500 {
        tracing::error!(error = %err, "request failed");
    }
    let (status, response) = map_error(&err);
    HttpResponse::build(status).json(response)
}
